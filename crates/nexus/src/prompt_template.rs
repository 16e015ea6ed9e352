use include_dir::{include_dir, Dir};
use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

static PROMPTS: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/prompts");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

/// Render one of the prompts compiled into the crate, e.g. `planning.md`
pub fn load_prompt_file<T: Serialize>(name: &str, context_data: &T) -> Result<String, TeraError> {
    let template = PROMPTS
        .get_file(name)
        .and_then(|file| file.contents_utf8())
        .ok_or_else(|| TeraError::msg(format!("Prompt template not found: {}", name)))?;
    load_prompt(template, context_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::Tool;
    use serde_json::json;
    use std::collections::HashMap;

    fn catalog() -> Vec<Tool> {
        vec![
            Tool::new(
                "fs.list_directory",
                "Lists files in a directory",
                json!({"type": "object", "properties": {"path": {"type": "string"}}}),
            ),
            Tool::new(
                "archive.extract",
                "Extracts an archive",
                json!({"type": "object"}),
            ),
        ]
    }

    #[test]
    fn test_load_prompt() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut context = HashMap::new();
        context.insert("name".to_string(), "Alice".to_string());
        context.insert("age".to_string(), 30.to_string());

        let result = load_prompt(template, &context).unwrap();
        assert_eq!(result, "Hello, Alice! You are 30 years old.");
    }

    #[test]
    fn test_load_prompt_missing_variable() {
        let template = "Hello, {{ name }}!";
        let context: HashMap<String, String> = HashMap::new();
        assert!(load_prompt(template, &context).is_err());
    }

    #[test]
    fn test_missing_prompt_file() {
        let context: HashMap<String, String> = HashMap::new();
        let err = load_prompt_file("nonexistent.md", &context).unwrap_err();
        assert!(err.to_string().contains("nonexistent.md"));
    }

    #[test]
    fn test_planning_prompt_lists_tools() {
        let mut context = HashMap::new();
        context.insert("tools".to_string(), catalog());

        let rendered = load_prompt_file("planning.md", &context).unwrap();
        assert!(rendered.contains("Nexus Orchestrator"));
        assert!(rendered.contains("- **fs.list_directory**: Lists files in a directory"));
        assert!(rendered.contains("- **archive.extract**: Extracts an archive"));
    }

    #[test]
    fn test_execution_prompt_is_distinct() {
        let mut context = HashMap::new();
        context.insert("tools".to_string(), catalog());

        let rendered = load_prompt_file("execution.md", &context).unwrap();
        assert!(!rendered.contains("Nexus Orchestrator"));
        assert!(rendered.contains("fs.list_directory"));
    }

    #[test]
    fn test_summarize_prompt() {
        let mut context = HashMap::new();
        context.insert("tools".to_string(), Vec::<Tool>::new());
        let rendered = load_prompt_file("summarize.md", &context).unwrap();
        assert!(rendered.contains("final answer"));
        assert!(!rendered.contains("Tools that were available"));

        context.insert("tools".to_string(), catalog());
        let rendered = load_prompt_file("summarize.md", &context).unwrap();
        assert!(rendered.contains("fs.list_directory, archive.extract."));
    }
}
