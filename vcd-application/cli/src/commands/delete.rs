//! 级联删除命令

use anyhow::{Context, Result};
use tracing::info;
use vcd_platform::{OrgHandle, SubtreeRoot, VdcHandle};

use crate::commands::output::print_json;
use crate::commands::session::Session;
use crate::{DeleteAction, RootKind};

pub async fn handle(action: DeleteAction, session: &Session) -> Result<()> {
    match action {
        DeleteAction::Plan {
            kind,
            href,
            force,
            recursive,
        } => {
            let root = root_handle(session, kind, &href);
            let plan = session
                .client()
                .orchestrator()
                .plan_subtree(&root, force, recursive)
                .await
                .context("生成删除计划失败")?;
            match plan {
                Some(plan) => print_json(&plan)?,
                None => info!("{} 已不存在，无需删除", href),
            }
        }
        DeleteAction::Run {
            kind,
            href,
            force,
            recursive,
        } => {
            let root = root_handle(session, kind, &href);
            let report = session
                .client()
                .orchestrator()
                .delete_subtree(root, force, recursive)
                .await
                .context("删除失败")?;
            info!(
                "删除完成: 执行 {} 步, 跳过 {} 步",
                report.executed.len(),
                report.skipped.len()
            );
            print_json(&report)?;
        }
    }
    Ok(())
}

/// 根对象只需 href，是否存在由删除流程自行判断
fn root_handle(session: &Session, kind: RootKind, href: &str) -> SubtreeRoot {
    let transport = session.client().transport();
    match kind {
        RootKind::Org => SubtreeRoot::from(OrgHandle::new(transport, href)),
        RootKind::Vdc => SubtreeRoot::from(VdcHandle::new(transport, href)),
    }
}
