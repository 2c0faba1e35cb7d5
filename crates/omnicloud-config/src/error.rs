use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "スタック '{stack}' の設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - プロジェクトルート: omnicloud.{stack}.yaml\n\
        - ./.omnicloud/ ディレクトリ\n\
        - ~/.config/omnicloud/omnicloud.{stack}.yaml\n\
        または OMNICLOUD_CONFIG_PATH 環境変数で直接指定できます"
    )]
    StackFileNotFound { stack: String },

    #[error("必須の設定キーがありません: {0}")]
    MissingKey(String),

    #[error("設定キー '{key}' の値が不正です ({expected} が必要): {value}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("YAML パースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
