use crate::utils;
use colored::Colorize;
use omnicloud_cloud::StateManager;
use std::path::Path;

pub async fn handle(project_root: &Path, stack_name: &str, json: bool) -> anyhow::Result<()> {
    let state = StateManager::new(project_root, stack_name).load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.outputs)?);
        return Ok(());
    }

    if state.outputs.is_empty() {
        println!(
            "{}",
            format!(
                "スタック '{}' の出力はありません。先に omni up {} --yes を実行してください",
                stack_name, stack_name
            )
            .yellow()
        );
        return Ok(());
    }

    utils::print_outputs(&state.outputs);
    Ok(())
}
