//! 组织查询命令

use anyhow::{Context, Result};

use crate::commands::output::print_json;
use crate::commands::session::Session;
use crate::OrgAction;

pub async fn handle(action: OrgAction, session: &Session) -> Result<()> {
    match action {
        OrgAction::Show { name } => {
            let org = session
                .client()
                .org()
                .find_by_name(&name)
                .await
                .with_context(|| format!("查询组织失败: {}", name))?;
            print_json(&org.require_initialized()?)?;
        }
    }
    Ok(())
}
