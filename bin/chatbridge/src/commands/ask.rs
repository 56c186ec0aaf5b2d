use chatbridge_core::{Config, Paths};
use tracing::warn;

/// Launch the browser, send one prompt, print the reply and shut down.
pub async fn run(prompt: String, context_id: Option<String>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_with_env(&paths)?;

    let (service, _anchor) = super::start_service(&config, &paths).await?;
    let outcome = service.handle_prompt(&prompt, context_id.as_deref()).await;

    if let Err(e) = service.shutdown().await {
        warn!(error = %e, "Browser shutdown failed");
    }

    let reply = outcome?;
    println!("{}", reply.reply);
    eprintln!();
    eprintln!("chatId: {}", reply.session_id);
    Ok(())
}
