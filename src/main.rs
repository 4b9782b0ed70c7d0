#[tokio::main]
async fn main() -> std::process::ExitCode {
    match impactlens::run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("impactlens: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
