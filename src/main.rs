use clap::Parser;
use mig_reach::core::lookup::Lookup;
use mig_reach::core::pipeline::{Job, ResolvedTargets};
use mig_reach::utils::error::ErrorSeverity;
use mig_reach::utils::shutdown::{install_ctrl_c_handler, ShutdownCoordinator};
use mig_reach::utils::{logger, validation::Validate};
use mig_reach::{
    CliConfig, EtlEngine, EtlError, GraphApiClient, LocalStorage, QueryPlan, ReachPipeline,
    TomlConfig, WorkQueue,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliConfig::parse();

    // 載入 TOML 配置（在初始化日誌前，才能讀取 monitoring.json_logs）
    let config_result = TomlConfig::from_file(&args.config);
    let json_logs = args.json_logs
        || config_result
            .as_ref()
            .map(TomlConfig::json_logs)
            .unwrap_or(false);

    if json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting mig-reach");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match config_result {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    args.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    // client 只建立一次，之後明確傳給各元件
    let client = match GraphApiClient::new(config.api_settings()) {
        Ok(client) => client,
        Err(e) => exit_with(&e),
    };

    if args.list_destinations || args.list_origins {
        let lookup = match Lookup::fetch(&client).await {
            Ok(lookup) => lookup,
            Err(e) => exit_with(&e),
        };
        if args.list_destinations {
            println!("Destinations:");
            for name in lookup.destination_names() {
                println!("  {}", name);
            }
        }
        if args.list_origins {
            println!("Origins:");
            for name in lookup.origin_names() {
                println!("  {}", name);
            }
        }
        return Ok(());
    }

    let plan = QueryPlan::from_config(&config)?;
    display_config_summary(&config, &plan, &args);

    let shutdown = ShutdownCoordinator::shared();
    install_ctrl_c_handler(shutdown.clone());

    let storage = LocalStorage::new(config.output_path());
    let pipeline = ReachPipeline::new(
        client,
        storage,
        plan,
        config.backoff_policy(),
        shutdown,
    )
    .with_archive(config.archive_name().map(str::to_string))
    .with_reuse_output(config.resume());

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No estimates will be requested");
        let targets = match pipeline.resolve().await {
            Ok(targets) => targets,
            Err(e) => exit_with(&e),
        };
        perform_dry_run(&pipeline.planned_queues(&targets), &targets, &config);
        return Ok(());
    }

    let engine = EtlEngine::new(pipeline).with_summary(config.write_summary());

    match engine.run().await {
        Ok(report) => {
            for file in &report.summary.files {
                tracing::debug!("Wrote {}", file);
            }
            println!(
                "📁 {} files saved to: {}",
                report.summary.files.len(),
                config.output_path()
            );

            if report.is_complete() {
                tracing::info!("✅ All estimates collected");
                println!("✅ All estimates collected");
            } else {
                for job in &report.summary.jobs {
                    for remaining in &job.remaining {
                        println!(
                            "⏳ {} / {}: {}",
                            job.job.name(),
                            remaining.destination,
                            remaining.segments.join(", ")
                        );
                    }
                }
                if let Some(e) = &report.error {
                    println!("💡 {}", e.recovery_suggestion());
                    exit_with(e);
                }
            }
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}

fn exit_with(e: &EtlError) -> ! {
    tracing::error!(
        "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}

fn display_config_summary(config: &TomlConfig, plan: &QueryPlan, args: &CliConfig) {
    println!("📋 Configuration Summary:");
    println!("  API: {}/{}", config.base_url(), config.api_version());
    println!("  Destinations: {}", plan.destinations.join(", "));
    if !plan.origins.is_empty() {
        println!("  Origins: {}", plan.origins.join(", "));
    }
    println!(
        "  Jobs: {}",
        plan.jobs.iter().map(|j| j.name()).collect::<Vec<_>>().join(", ")
    );
    println!("  Output: {}", config.output_path());
    if config.resume() {
        println!("  Resume: estimates already in the output are kept");
    }

    let policy = config.backoff_policy();
    println!(
        "  Pacing: {:?} between calls, {:?} pause on rate limit",
        policy.call_delay, policy.pause_duration
    );
    if let Some(budget) = policy.call_budget {
        println!("  Call budget per window: {}", budget);
    }
    if policy.treat_all_errors_as_rate_limit {
        println!("  ⚠️ Every failure pauses the run");
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(queues: &[(Job, WorkQueue)], targets: &ResolvedTargets, config: &TomlConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📡 Resolved targets:");
    for (name, code) in &targets.destinations {
        println!("  {} -> {}", name, code);
    }
    for origin in &targets.origins {
        println!("  {} -> {} ({})", origin.country, origin.id, origin.name);
    }

    let policy = config.backoff_policy();
    let mut total_calls = 0;
    println!();
    println!("⚙️ Planned calls:");
    for (job, queue) in queues {
        println!("  {}: {} calls", job.name(), queue.remaining_calls());
        total_calls += queue.remaining_calls();
    }

    let minimum = policy.minimum_duration(total_calls);
    println!(
        "  Total: {} calls, at least {:?} without rate-limit pauses",
        total_calls,
        Duration::from_secs(minimum.as_secs())
    );

    println!();
    println!("✅ Dry run analysis complete.");
}
