//! vApp 组合命令
//!
//! 组合请求从 JSON 文件读取，格式与 `CompositionRequest` 的序列化形式一致：
//!
//! ```json
//! {
//!   "name": "web",
//!   "networks": [{ "name": "net-a", "fenceMode": "isolated" }],
//!   "vms": [{ "name": "vm1", "sourceHref": "https://.../vAppTemplate/vm-1",
//!             "networks": [{ "network": "net-a", "primary": true }] }]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use vcd_platform::{CompositionRequest, CompositionTarget, TaskSnapshot, VApp};

use crate::commands::output::print_json;
use crate::commands::session::Session;
use crate::VappAction;

#[derive(Serialize)]
struct ComposeOutput<'a> {
    vapp: Option<&'a VApp>,
    task: TaskSnapshot,
}

pub async fn handle(action: VappAction, session: &Session) -> Result<()> {
    match action {
        VappAction::Compose { vdc, file, no_wait } => {
            compose(session, &vdc, &file, !no_wait).await?
        }
        VappAction::Recompose { href, file } => recompose(session, &href, &file).await?,
    }
    Ok(())
}

fn read_request(path: &Path) -> Result<CompositionRequest> {
    let content =
        fs::read_to_string(path).with_context(|| format!("读取组合请求失败: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("解析组合请求失败: {:?}", path))
}

async fn compose(session: &Session, vdc_href: &str, file: &Path, wait: bool) -> Result<()> {
    let request = read_request(file)?;
    let client = session.client();

    let vdc = client
        .vdc()
        .get(vdc_href)
        .await
        .with_context(|| format!("获取虚拟数据中心失败: {}", vdc_href))?;

    let (mut vapp, mut task) = client
        .vapp()
        .create(&vdc, request)
        .await
        .context("组合 vApp 失败")?;
    info!("已提交 vApp 组合: {} (任务 {})", vapp.href(), task.href());

    if wait {
        let tracker = client.tracker();
        let timeout = tracker.config().timeout();
        tracker
            .await_completion(&mut task, timeout)
            .await
            .context("vApp 组合任务失败")?;
        if let Err(e) = vapp.refresh().await {
            warn!("刷新 vApp 失败: {}", e);
        }
    }

    print_json(&ComposeOutput {
        vapp: vapp.snapshot(),
        task: task.snapshot(),
    })
}

async fn recompose(session: &Session, href: &str, file: &Path) -> Result<()> {
    let request = read_request(file)?;
    let client = session.client();

    let mut vapp = client
        .vapp()
        .get(href)
        .await
        .with_context(|| format!("获取 vApp 失败: {}", href))?;

    let (_, mut task) = client
        .composer()
        .compose_vapp(CompositionTarget::Update(&vapp), request)
        .await
        .context("重组 vApp 失败")?;

    let tracker = client.tracker();
    let timeout = tracker.config().timeout();
    tracker
        .await_completion(&mut task, timeout)
        .await
        .context("vApp 重组任务失败")?;
    vapp.refresh().await.context("刷新 vApp 失败")?;

    print_json(&ComposeOutput {
        vapp: vapp.snapshot(),
        task: task.snapshot(),
    })
}
