//! Dev command line: run one auto-approved pipeline pass and print the
//! Markdown export

use paperscout::workflow::WorkflowEngine;
use paperscout::{build_stages, render, Config, ExportFormat};

#[tokio::main]
async fn main() {
    paperscout::logging::init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: paperscout <query words...>");
        std::process::exit(1);
    }
    let query = args.join(" ");

    match run(&query).await {
        Ok(markdown) => {
            println!("{}", markdown);
        }
        Err(message) => {
            eprintln!("error: {}", message);
            std::process::exit(1);
        }
    }
}

async fn run(query: &str) -> Result<String, String> {
    let config = Config::from_env();
    let stages = build_stages(&config).map_err(|err| err.to_string())?;
    let engine = WorkflowEngine::new(stages, config.engine.clone());

    let outcome = engine.run(query).await.map_err(|err| err.to_string())?;
    render(&outcome.collection, ExportFormat::Markdown).map_err(|err| err.to_string())
}
