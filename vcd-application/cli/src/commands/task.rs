//! 任务等待命令

use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::commands::output::print_json;
use crate::commands::session::Session;
use crate::TaskAction;

pub async fn handle(action: TaskAction, session: &Session) -> Result<()> {
    match action {
        TaskAction::Wait { href, timeout } => wait(session, &href, timeout).await?,
    }
    Ok(())
}

async fn wait(session: &Session, href: &str, timeout: Option<u64>) -> Result<()> {
    let client = session.client();
    let tracker = client.tracker();
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| tracker.config().timeout());

    info!("等待任务 {} (超时 {:?})", href, timeout);
    let mut task = client.task(href);
    let outcome = tracker.await_completion(&mut task, timeout).await;

    print_json(&task.snapshot())?;
    outcome?;
    Ok(())
}
