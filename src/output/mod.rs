use anyhow::Result;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::pipeline::PreviewState;

pub mod formatters;

pub use formatters::*;

fn render(state: &PreviewState, answer: Option<&Answer>, format: &OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => format_as_text(state, answer),
        OutputFormat::Json => format_as_json(state, answer)?,
    })
}

/// Save processing result to file
pub async fn save_to_file(
    state: &PreviewState,
    answer: Option<&Answer>,
    path: &Path,
    format: &OutputFormat,
) -> Result<()> {
    let content = render(state, answer, format)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Print processing result to console
pub fn print_to_console(state: &PreviewState, answer: Option<&Answer>, format: &OutputFormat) -> Result<()> {
    let content = render(state, answer, format)?;
    println!("{}", content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ProcessingState;

    #[tokio::test]
    async fn test_save_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("result.json");

        let mut state = PreviewState::new(1);
        state.status = ProcessingState::Completed;
        state.accessible = "Hello".to_string();

        save_to_file(&state, None, &path, &OutputFormat::Json).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["accessible"], "Hello");
    }
}
