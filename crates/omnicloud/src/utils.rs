use colored::Colorize;
use omnicloud_cloud::{ActionType, ApplyResult, Plan};
use omnicloud_config::StackConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// プロジェクト内で見つかったスタック名の一覧
pub fn available_stacks(project_root: &Path) -> Vec<String> {
    let mut stacks: Vec<String> = [project_root.to_path_buf(), project_root.join(".omnicloud")]
        .iter()
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_prefix("omnicloud.")
                .and_then(|rest| rest.strip_suffix(".yaml"))
                .map(|stack| stack.to_string())
        })
        .collect();
    stacks.sort();
    stacks.dedup();
    stacks
}

/// スタック名を決定する（共通ロジック）
pub fn determine_stack_name(stack: Option<String>, project_root: &Path) -> anyhow::Result<String> {
    if let Some(s) = stack {
        return Ok(s);
    }

    let stacks = available_stacks(project_root);
    match stacks.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(anyhow::anyhow!(
            "スタック名を指定してください: omni <command> <stack> または OMNICLOUD_STACK=<stack>\n利用可能なスタック: {}",
            if stacks.is_empty() {
                "(なし)".to_string()
            } else {
                stacks.join(", ")
            }
        )),
    }
}

/// スタック設定を読み込み、読み込んだファイルを表示
pub fn load_stack(project_root: &Path, stack: &str) -> anyhow::Result<(StackConfig, PathBuf)> {
    let path = omnicloud_config::find_stack_file(project_root, stack)?;
    println!("📄 読み込んだ設定ファイル:");
    println!("  • {}", path.display().to_string().cyan());

    let content = std::fs::read_to_string(&path)?;
    let config = StackConfig::from_yaml_str(&content)?;
    Ok((config, path))
}

/// 実行計画を表示
pub fn print_plan(plan: &Plan) {
    for action in &plan.actions {
        let (symbol, line) = match action.action_type {
            ActionType::Create => ("+".green(), action.description.green()),
            ActionType::Delete => ("-".red(), action.description.red()),
            ActionType::Retain => ("~".yellow(), action.description.yellow()),
            ActionType::NoOp => ("=".dimmed(), action.description.dimmed()),
        };
        println!("  {} {}", symbol, line);
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

/// 適用結果を表示
pub fn print_apply_result(result: &ApplyResult) {
    for success in &result.succeeded {
        println!("  {} {} ({})", "✓".green(), success.action_id, success.message);
    }
    for failure in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    for skipped in &result.skipped {
        println!("  {} {} (依存先の失敗によりスキップ)", "-".dimmed(), skipped);
    }
    println!(
        "{}",
        format!(
            "{} 件成功, {} 件失敗, {} 件スキップ ({} ms)",
            result.succeeded.len(),
            result.failed.len(),
            result.skipped.len(),
            result.duration_ms
        )
        .dimmed()
    );
}

fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// スタックの出力を表示
pub fn print_outputs(outputs: &BTreeMap<String, serde_json::Value>) {
    println!("{}", "出力:".bold());
    for (key, value) in outputs {
        println!("  {}: {}", key.cyan(), format_value(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_stack_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(determine_stack_name(None, temp_dir.path()).is_err());

        std::fs::write(temp_dir.path().join("omnicloud.dev.yaml"), "config: {}").unwrap();
        assert_eq!(determine_stack_name(None, temp_dir.path()).unwrap(), "dev");

        std::fs::create_dir(temp_dir.path().join(".omnicloud")).unwrap();
        std::fs::write(
            temp_dir.path().join(".omnicloud/omnicloud.prod.yaml"),
            "config: {}",
        )
        .unwrap();
        assert_eq!(available_stacks(temp_dir.path()), vec!["dev", "prod"]);
        assert!(determine_stack_name(None, temp_dir.path()).is_err());
        assert_eq!(
            determine_stack_name(Some("prod".into()), temp_dir.path()).unwrap(),
            "prod"
        );
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&serde_json::json!("a")), "a");
        assert_eq!(
            format_value(&serde_json::json!(["ns1.", "ns2."])),
            "ns1., ns2."
        );
        assert_eq!(format_value(&serde_json::json!(300)), "300");
    }
}
