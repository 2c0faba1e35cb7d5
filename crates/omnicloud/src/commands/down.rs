use crate::utils;
use colored::Colorize;
use omnicloud_cloud::{DependencyGraph, Engine, StateManager};
use omnicloud_components::{Stack, simulated_provisioner};
use std::path::Path;
use std::sync::Arc;

pub async fn handle(project_root: &Path, stack_name: &str, yes: bool) -> anyhow::Result<()> {
    println!("スタック: {}", stack_name.cyan());
    let (config, _) = utils::load_stack(project_root, stack_name)?;

    let mut graph = DependencyGraph::new();
    Stack::build(&mut graph, &config)?;

    let state_manager = StateManager::new(project_root, stack_name);
    let mut state = state_manager.load().await?;

    if state.resources.is_empty() {
        println!();
        println!("{}", "削除するリソースはありません".dimmed());
        return Ok(());
    }

    let engine = Engine::new(Arc::new(simulated_provisioner()));
    let plan = engine.teardown_plan(&graph, &state);
    println!();
    println!("{}", "削除計画:".bold());
    utils::print_plan(&plan);

    if !yes {
        println!();
        println!(
            "{}",
            "削除するには --yes (-y) を指定してください".yellow()
        );
        return Ok(());
    }

    let lock = state_manager.acquire_lock().await?;

    println!();
    println!("{}", "削除中...".blue());
    let result = engine.teardown(&graph, &mut state).await?;
    utils::print_apply_result(&result);

    state_manager.save(&state).await?;
    lock.release().await?;

    if let Some(failure) = result.first_failure() {
        anyhow::bail!(
            "{} の削除に失敗しました: {}",
            failure.action_id,
            failure.error.as_deref().unwrap_or_default()
        );
    }

    println!();
    if state.resources.is_empty() {
        println!("{}", "✓ スタックを削除しました".green().bold());
    } else {
        println!(
            "{}",
            format!(
                "✓ 削除完了 ({} 件のリソースは管理外のため残っています)",
                state.resources.len()
            )
            .green()
            .bold()
        );
    }
    Ok(())
}
