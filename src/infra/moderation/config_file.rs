use std::path::Path;

use anyhow::Context;
use tokio::fs;

use crate::core::moderation::ModerationConfig;

/// Load and validate the chain configuration from a YAML file.
pub async fn load_config(path: impl AsRef<Path>) -> anyhow::Result<ModerationConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading moderation config {}", path.display()))?;

    let config: ModerationConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing moderation config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_loads_chain_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"
admin_ids: [111, 222]
allowed_conversation_ids: [-100]
filters:
  - name: newcomers
    kind: checkNevents
    arguments:
      n: 3
      isFinal: true
    rules:
      - name: words
        kind: regex
        arguments:
          patterns: ["casino", "free\\s+money"]
    actions:
      - kind: deleteAndBan
        arguments:
          dryRun: false
"#
        )
        .unwrap();

        let config = load_config(tmp.path()).await.unwrap();

        assert_eq!(config.admin_ids, vec![111, 222]);
        assert_eq!(config.filters.len(), 1);
        let filter = &config.filters[0];
        assert_eq!(filter.arguments.get_int("n").unwrap(), 3);
        assert_eq!(filter.rules[0].arguments.get_string_list_or_empty("patterns").unwrap()[1], "free\\s+money");
        assert_eq!(filter.actions[0].display_name(), "deleteAndBan");
    }

    #[tokio::test]
    async fn test_rejects_config_without_admins() {
        let mut tmp = NamedTempFile::new().unwrap();
        write!(tmp, "filters: []\n").unwrap();

        assert!(load_config(tmp.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_owned();
        drop(tmp);

        assert!(load_config(&path).await.is_err());
    }
}
