//! In-process tool handlers.
//!
//! A [`LocalTool`] wraps a pure function of its input. The two built-ins
//! synthesize a UI design artifact and a code-generation stub from structured
//! input; neither performs I/O.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{MaestroError, Result};

pub const DESIGN_UI: &str = "design/ui-spec";
pub const DEVELOP_LOGIC: &str = "codegen/develop-logic";

type SynthesizeFn = dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync;

/// A handler that computes its result without leaving the process.
#[derive(Clone)]
pub struct LocalTool {
    synthesize: Arc<SynthesizeFn>,
}

impl fmt::Debug for LocalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTool").finish_non_exhaustive()
    }
}

impl LocalTool {
    pub fn new<F>(synthesize: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            synthesize: Arc::new(synthesize),
        }
    }

    pub fn execute(&self, tool_name: &str, input: &Value) -> Result<Value> {
        (self.synthesize)(input).map_err(|cause| MaestroError::ToolExecution {
            tool_name: tool_name.to_string(),
            cause,
        })
    }
}

fn project_name(input: &Value) -> std::result::Result<&str, String> {
    input
        .get("projectName")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| "projectName is required".to_string())
}

/// Page/component layout, design system and routes for a project.
pub fn design_ui(input: &Value) -> std::result::Result<Value, String> {
    let project = project_name(input)?;
    let requirements = input
        .get("requirements")
        .and_then(Value::as_str)
        .unwrap_or("Modern, responsive design");

    Ok(json!({
        "toolName": DESIGN_UI,
        "status": "completed",
        "result": {
            "projectName": project,
            "components": [
                {
                    "name": "HomePage",
                    "type": "page",
                    "elements": ["Header", "Hero", "Features", "Footer"],
                    "styling": "tailwindcss",
                },
                {
                    "name": "Dashboard",
                    "type": "page",
                    "elements": ["Sidebar", "DataTable", "Charts", "Actions"],
                    "styling": "tailwindcss",
                },
            ],
            "designSystem": {
                "colors": {
                    "primary": "#3B82F6",
                    "secondary": "#10B981",
                    "accent": "#F59E0B",
                    "background": "#FFFFFF",
                    "text": "#1F2937",
                },
                "typography": {
                    "fontFamily": "Inter, system-ui, sans-serif",
                    "scale": ["12px", "14px", "16px", "20px", "24px", "32px", "48px"],
                },
                "spacing": ["4px", "8px", "16px", "24px", "32px", "48px", "64px"],
            },
            "routes": [
                { "path": "/", "component": "HomePage" },
                { "path": "/dashboard", "component": "Dashboard" },
            ],
            "requirements": requirements,
        },
    }))
}

/// Source file plan, dependencies and build config derived from a design.
///
/// Pages come from the previous step's components when present.
pub fn develop_logic(input: &Value) -> std::result::Result<Value, String> {
    let project = project_name(input)?;
    let design_spec = input
        .get("designSpec")
        .cloned()
        .unwrap_or(Value::Null);

    let pages: Vec<String> = input
        .pointer("/previousStepOutput/result/components")
        .and_then(Value::as_array)
        .map(|components| {
            components
                .iter()
                .filter_map(|c| c.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .filter(|pages: &Vec<String>| !pages.is_empty())
        .unwrap_or_else(|| vec!["HomePage".into(), "Dashboard".into()]);

    let mut files: Vec<Value> = pages
        .iter()
        .map(|page| {
            json!({
                "path": format!("src/pages/{page}.tsx"),
                "language": "typescript",
                "framework": "react",
                "content": format!("// {page} component implementation"),
            })
        })
        .collect();
    files.push(json!({
        "path": "src/App.tsx",
        "language": "typescript",
        "framework": "react",
        "content": "// Main App component with routing",
    }));
    files.push(json!({
        "path": "src/index.tsx",
        "language": "typescript",
        "framework": "react",
        "content": "// Entry point",
    }));

    Ok(json!({
        "toolName": DEVELOP_LOGIC,
        "status": "completed",
        "result": {
            "projectName": project,
            "files": files,
            "dependencies": {
                "react": "^18.2.0",
                "react-dom": "^18.2.0",
                "react-router-dom": "^6.20.0",
            },
            "devDependencies": {
                "typescript": "^5.3.0",
                "vite": "^5.0.0",
                "tailwindcss": "^3.4.0",
            },
            "buildConfig": {
                "bundler": "vite",
                "target": "esnext",
                "outDir": "dist",
            },
            "designSpec": design_spec,
        },
    }))
}
