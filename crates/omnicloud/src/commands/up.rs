use crate::utils;
use colored::Colorize;
use omnicloud_cloud::{DependencyGraph, Engine, StateManager};
use omnicloud_components::{Stack, StackOutputs, simulated_provisioner};
use std::path::Path;
use std::sync::Arc;

pub async fn handle(project_root: &Path, stack_name: &str, yes: bool) -> anyhow::Result<()> {
    println!("スタック: {}", stack_name.cyan());
    let (config, _) = utils::load_stack(project_root, stack_name)?;

    let mut graph = DependencyGraph::new();
    let stack = Stack::build(&mut graph, &config)?;

    let state_manager = StateManager::new(project_root, stack_name);
    let mut state = state_manager.load().await?;
    let engine = Engine::new(Arc::new(simulated_provisioner()));

    let plan = engine.plan(&graph, &state);
    println!();
    println!("{}", "実行計画:".bold());
    utils::print_plan(&plan);

    if !yes {
        println!();
        println!(
            "{}",
            "実行するには --yes (-y) を指定してください".yellow()
        );
        return Ok(());
    }

    let lock = state_manager.acquire_lock().await?;

    println!();
    println!(
        "{} ({})",
        "プロビジョニング中...".blue(),
        engine.provisioner_name()
    );
    let result = engine.provision(&mut graph, &mut state).await?;
    utils::print_apply_result(&result);

    // 失敗時も作成済みのリソースは記録する
    if !result.is_success() {
        state_manager.save(&state).await?;
        lock.release().await?;
        let detail = result
            .first_failure()
            .and_then(|failure| failure.error.clone())
            .unwrap_or_default();
        anyhow::bail!(
            "プロビジョニングに失敗しました ({} 件失敗, {} 件スキップ): {}",
            result.failed.len(),
            result.skipped.len(),
            detail
        );
    }

    let outputs = StackOutputs::collect(stack.outputs()).await?;
    state.set_outputs(outputs.into_map());
    state_manager.save(&state).await?;
    lock.release().await?;

    println!();
    println!("{}", "✓ スタックの準備ができました".green().bold());
    utils::print_outputs(&state.outputs);
    Ok(())
}
