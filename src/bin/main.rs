use scam_triage_orchestrator::{
    config::OrchestratorConfig,
    sequencer::{Investigation, StepOutcome},
    tasks::AnalysisSuite,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Offline demonstration run: drives one scripted investigation end to end,
/// answering the interview questions from a canned transcript.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Scam Investigation Orchestrator starting");

    let transaction = json!({
        "transaction_id": "ALRT-2024-0042",
        "amount": 4850.00,
        "currency": "GBP",
        "payee": "QuickFix Support Services",
        "channel": "faster_payments",
        "first_time_payee": true
    });

    let mut investigation = Investigation::new(
        "ALRT-2024-0042",
        transaction,
        Arc::new(AnalysisSuite::scripted()),
        OrchestratorConfig::from_env()?,
    );

    let mut canned_answers = vec![
        "A man called saying my account was compromised",
        "He asked me to install AnyDesk so he could secure it",
    ]
    .into_iter();

    loop {
        match investigation.run_until_suspend().await? {
            StepOutcome::AwaitingAnswer => {
                let question = investigation
                    .case()
                    .pending_question()
                    .map(|t| t.question.clone())
                    .unwrap_or_default();
                println!("\nQ: {}", question);

                match canned_answers.next() {
                    Some(answer) => {
                        println!("A: {}", answer);
                        investigation.submit_answer(answer)?;
                    }
                    None => {
                        println!("(no more canned answers, requesting finalization)");
                        investigation.force_finalize();
                    }
                }
            }
            _ => break,
        }
    }

    let snapshot = investigation.snapshot();
    println!("\n=== INVESTIGATION RESULT ===");
    println!("Case ID: {}", snapshot.case.case_id);
    println!("Phase: {}", snapshot.phase);
    println!(
        "Steps: {}/{}",
        snapshot.current_step, snapshot.total_steps
    );
    println!("\nFindings:");
    for (key, text) in &snapshot.case.findings {
        println!("  {}: {}", key, text);
    }
    if let Some(gate) = snapshot.case.gate_history.last() {
        println!(
            "\nGate: passed={} answered_turns={} indicators={:?}",
            gate.passed, gate.answered_turns, gate.matched_indicators
        );
    }

    Ok(())
}
