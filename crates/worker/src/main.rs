use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use i2v_worker::config::WorkerConfig;
use i2v_worker::handler;
use i2v_worker::job::JobRequest;

/// Read the job payload from the file named by the first argument, or
/// from stdin when no argument is given.
fn read_payload() -> std::io::Result<String> {
    match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path),
        None => {
            use std::io::Read;
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "i2v_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = WorkerConfig::from_env();

    // Failures from here on are job results, not crashes: the invoking
    // platform reads exactly one JSON object from stdout.
    let output = match read_payload() {
        Ok(raw) => match serde_json::from_str::<JobRequest>(&raw) {
            Ok(request) => serde_json::to_value(handler::run_job(&config, request).await)
                .unwrap_or_else(|e| serde_json::json!({ "error": format!("unserializable result: {e}") })),
            Err(e) => serde_json::json!({ "error": format!("invalid job payload: {e}") }),
        },
        Err(e) => serde_json::json!({ "error": format!("could not read job payload: {e}") }),
    };

    println!("{output}");
}
