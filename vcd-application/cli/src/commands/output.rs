use anyhow::{Context, Result};
use serde::Serialize;

/// 以格式化 JSON 输出
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("序列化输出失败")?;
    println!("{}", text);
    Ok(())
}
