//! `moonagent stream`: print each step result as soon as it is produced.

use std::sync::Arc;

use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

pub async fn run(message: String, offline: bool) -> anyhow::Result<()> {
    let (config, manus) = super::build_manus(offline)?;
    let ctx = Arc::new(manus.context());

    let token = ctx.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut messages = ReceiverStream::new(manus.run_stream(Arc::clone(&ctx), message)?);
    let mut step = 0;
    while let Some(message) = messages.next().await {
        if let Some(id) = message.metadata.get("checkpoint_id").and_then(|v| v.as_str()) {
            if let Some(pending) = manus.pending_action(id).await? {
                super::print_pending(id, &pending);
                super::print_resume_hint(&config, id);
                continue;
            }
        }
        step += 1;
        println!("── [{step}] ──────────────────────────────────────────");
        println!("{}", message.content);
        println!();
    }
    Ok(())
}
