use campaign_forecast_builder::{
    build_impact_analysis, serialize_artifact, ArtifactStore, ForecastConfig, ForecastPipeline,
    ImpactFile,
};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::io::Write;

fn main() {
    let dir = std::env::temp_dir().join("campaign_forecast_demo");
    std::fs::create_dir_all(&dir).expect("demo dir");

    // Synthesize a Google Ads style export: upward click trend, spend that
    // varies day to day.
    let export_path = dir.join("google_export.csv");
    {
        let mut file = std::fs::File::create(&export_path).expect("export file");
        writeln!(file, "Campaign,Day,Clicks,Cost").unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        for i in 0..60i64 {
            let date = start + Duration::days(i);
            let clicks = 180 + i * 4 + (i % 5) * 7;
            let cost = 80.0 + 12.0 * ((i % 9) as f64);
            writeln!(
                file,
                "{},Brand,{},{:.2}",
                date.format("%Y-%m-%d"),
                clicks,
                cost
            )
            .unwrap();
        }
    }

    let analysis = ForecastPipeline::analyze(&export_path).expect("analyze export");
    println!(
        "Detected platform: {:?} (skip {} rows), date column: {}",
        analysis.clean.descriptor.source_platform,
        analysis.clean.descriptor.header_skip_count,
        analysis.clean.date_column
    );
    println!(
        "Daily average spend: {}{:.2}",
        analysis.budget.currency, analysis.budget.daily_average
    );

    let config = ForecastConfig {
        metrics: vec!["Clicks".to_string()],
        horizon: 14,
        use_budget_regressor: true,
        projected_daily_budget: Some(150.0),
    };
    let results = ForecastPipeline::forecast(&analysis, &config);

    for result in &results {
        println!("\nForecast for {}:", result.metric_name);
        for point in result.horizon_points.iter().take(5) {
            println!(
                "  {}  {:.1}  [{:.1}, {:.1}]",
                point.date, point.estimate, point.lower, point.upper
            );
        }
        if let Some(elasticity) = &result.elasticity {
            println!(
                "  elasticity: {:.3} ({:?}), baseline avg {:.1}",
                elasticity.coefficient, elasticity.direction, elasticity.baseline_average
            );
        }
    }

    // Persist the run, write the downloadable export, re-ingest it as an
    // impact input and run a what-if.
    let store = ArtifactStore::new(dir.join("store"));
    let id = ForecastPipeline::export(&analysis, &results, "Brand - Spring push", &store)
        .expect("export artifact");
    let artifact = store.read(&id).expect("read back artifact");

    let export_csv = dir.join("forecast_export.csv");
    std::fs::write(&export_csv, serialize_artifact(&artifact).expect("serialize"))
        .expect("write export");
    println!("\nSaved artifact {} and export {:?}", id, export_csv);

    let impact = build_impact_analysis(&[ImpactFile {
        original_name: "forecast_export.csv".to_string(),
        path: export_csv,
    }]);
    println!(
        "Impact view: {} entries, total budget {:.0}",
        impact.entries.len(),
        impact.total_budget()
    );

    let mut changes = HashMap::new();
    for entry in &impact.entries {
        changes.insert(entry.id.clone(), -30.0);
    }
    let simulated = impact.simulate(&changes);
    for entry in &simulated.entries {
        println!("\n{} ({}) at -30% budget:", entry.campaign, entry.platform);
        for metric in &entry.metrics {
            println!(
                "  {}: {:.1} -> {:.1} ({:+.1}%)",
                metric.name, metric.current, metric.simulated, metric.impact_percent
            );
        }
    }
}
