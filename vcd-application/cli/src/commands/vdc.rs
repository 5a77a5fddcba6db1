//! 虚拟数据中心查询命令

use anyhow::{Context, Result};

use crate::commands::output::print_json;
use crate::commands::session::Session;
use crate::VdcAction;

pub async fn handle(action: VdcAction, session: &Session) -> Result<()> {
    match action {
        VdcAction::Show { href } => {
            let vdc = session
                .client()
                .vdc()
                .get(&href)
                .await
                .with_context(|| format!("获取虚拟数据中心失败: {}", href))?;
            print_json(&vdc.require_initialized()?)?;
        }
    }
    Ok(())
}
