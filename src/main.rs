#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = answer_evaluator::run().await {
        eprintln!("answer-evaluator fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
