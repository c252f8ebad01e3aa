//! Run a few expressions through the calculator on the local simulator.
//!
//! ```text
//! cargo run --bin qcalc-demo
//! RUST_LOG=debug cargo run --bin qcalc-demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use quantum_calc::{CalcConfig, Controller, InputMode, LocalSimulator};
use tracing_subscriber::EnvFilter;

const EXPRESSIONS: &[(&str, InputMode)] = &[
    ("3+2", InputMode::Decimal),
    ("5-3", InputMode::Decimal),
    ("7+1", InputMode::Decimal),
    ("1+2-3+1", InputMode::Decimal),
    ("011+HHH", InputMode::Binary),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let controller = Controller::new(Arc::new(LocalSimulator::new()), CalcConfig::default())?;
    let config = controller.config();
    println!("Backends: {}", controller.list_backends().join(", "));
    println!("Backend:  {}", config.backend_id);
    println!("Qubits:   {}", config.qubits);
    println!();

    for &(text, mode) in EXPRESSIONS {
        let sequence = controller.sequence(text, mode);
        println!("{text}  =>  {sequence}");

        match controller.run_and_wait(&sequence, Duration::from_secs(30)).await {
            Ok(decoded) => {
                println!("  {}: {}", controller.status_line(), decoded.answer_string());
                for row in decoded.rows() {
                    println!("    {}  {:>4}  {}", row.bitstring, row.count, row.answer);
                }
            }
            Err(e) => println!("  {e}"),
        }
        println!();
    }

    println!("Last job:");
    for entry in controller.phase_log() {
        println!("  {entry}");
    }

    Ok(())
}
