//! Ready-made tool stages for the compilers and minifiers assetpipe knows.
//!
//! Each preset fixes the argument vector, the domain (which extensions the
//! tool touches), the input channel and the diagnostic policy. Program paths
//! come from the `[tools]` section; an unset path yields a stage that fails
//! with a configuration error naming the missing setting when it runs.

use std::path::Path;

use crate::config::ToolsConfig;
use crate::error::{PipelineError, Result};
use crate::stage::{ToolScope, ToolStage};

use super::{DiagnosticPolicy, InputChannel, ToolCommand};

/// Accepted `language_in` values for Closure Compiler.
pub const CLOSURE_LANGUAGES: &[&str] = &["ECMASCRIPT3", "ECMASCRIPT5", "ECMASCRIPT5_STRICT"];

/// Accepted `compilation_level` values for Closure Compiler.
pub const CLOSURE_LEVELS: &[&str] =
    &["WHITESPACE_ONLY", "SIMPLE_OPTIMIZATIONS", "ADVANCED_OPTIMIZATIONS"];

/// Output styles understood by the Sass CLI.
pub const SASS_STYLES: &[&str] = &["expanded", "compressed"];

fn jar_command(name: &str, tools: &ToolsConfig, jar: Option<&Path>, setting: &str) -> ToolCommand {
    match jar {
        Some(jar) => ToolCommand::new(name, tools.java.clone())
            .with_args(["-jar".to_string(), jar.to_string_lossy().into_owned()])
            .with_setting("tools.java"),
        None => ToolCommand::unconfigured(name, setting),
    }
}

fn check_choice(tool: &str, option: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(PipelineError::configuration(format!(
        "{}: unsupported {} '{}' (expected one of: {})",
        tool,
        option,
        value,
        allowed.join(", ")
    )))
}

/// Sass compiler: `.scss` in, `.css` out, content on stdin.
///
/// The input root and `tools.sass_load_paths` are passed as load paths so
/// `@import` resolves the way it does for files on disk.
pub fn sass(tools: &ToolsConfig, root: &Path, style: &str) -> Result<ToolStage> {
    check_choice("sass", "style", style, SASS_STYLES)?;

    let command = match &tools.sass {
        Some(program) => {
            let mut command = ToolCommand::new("sass", program.clone())
                .with_args(["--stdin".to_string(), format!("--style={}", style)])
                .arg(format!("--load-path={}", root.display()));
            for path in &tools.sass_load_paths {
                command = command.arg(format!("--load-path={}", path.display()));
            }
            command
        }
        None => ToolCommand::unconfigured("sass", "tools.sass"),
    };

    Ok(ToolStage::new("sass", command.with_timeout(tools.timeout()))
        .with_extensions(["scss"])
        .with_output_extension("css"))
}

/// YUI Compressor for `.css` and `.js`; any stderr output is an error.
pub fn yui(tools: &ToolsConfig) -> ToolStage {
    let command = jar_command("yui", tools, tools.yui_compressor.as_deref(), "tools.yui_compressor")
        .arg("--charset")
        .arg("utf-8")
        .arg("--type")
        .arg("{ext}")
        .with_diagnostics(DiagnosticPolicy::Fail)
        .with_timeout(tools.timeout());

    ToolStage::new("yui", command).with_extensions(["css", "js"])
}

/// Closure Compiler for `.js`; warnings are logged.
pub fn closure_compiler(tools: &ToolsConfig, language_in: &str, level: &str) -> Result<ToolStage> {
    check_choice("closure-compiler", "language_in", language_in, CLOSURE_LANGUAGES)?;
    check_choice("closure-compiler", "compilation_level", level, CLOSURE_LEVELS)?;

    let command = jar_command(
        "closure-compiler",
        tools,
        tools.closure_compiler.as_deref(),
        "tools.closure_compiler",
    )
    .arg("--language_in")
    .arg(language_in)
    .arg("--compilation_level")
    .arg(level)
    .with_diagnostics(DiagnosticPolicy::Warn)
    .with_timeout(tools.timeout());

    Ok(ToolStage::new("closure-compiler", command).with_extensions(["js"]))
}

/// Closure Builder over the whole `.js` set, producing one script.
///
/// Runs from the project root so relative `roots` resolve there. At least
/// one namespace is required.
pub fn closure_builder(tools: &ToolsConfig, roots: &[String], namespaces: &[String]) -> Result<ToolStage> {
    if namespaces.is_empty() {
        return Err(PipelineError::configuration(
            "closure-builder: at least one entry in `namespaces` is required",
        ));
    }

    let mut command = match &tools.closure_builder {
        Some(script) => ToolCommand::new("closure-builder", tools.python.clone())
            .arg(script.to_string_lossy().into_owned())
            .with_setting("tools.python"),
        None => ToolCommand::unconfigured("closure-builder", "tools.closure_builder"),
    };
    command = command.arg("--output_mode").arg("script");
    for root in roots {
        command = command.arg("--root").arg(root.clone());
    }
    for namespace in namespaces {
        command = command.arg("--namespace").arg(namespace.clone());
    }

    let command = command
        .with_input(InputChannel::Arguments)
        .with_diagnostics(DiagnosticPolicy::Ignore)
        .with_timeout(tools.timeout());

    Ok(ToolStage::new("closure-builder", command)
        .with_extensions(["js"])
        .with_scope(ToolScope::WholeSet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::test_support::{set_of, ContextFixture};
    use crate::stage::Transform;
    use std::path::PathBuf;

    fn tools_with_jars() -> ToolsConfig {
        ToolsConfig {
            sass: Some("sass".to_string()),
            yui_compressor: Some(PathBuf::from("jars/yui.jar")),
            closure_compiler: Some(PathBuf::from("jars/closure.jar")),
            closure_builder: Some(PathBuf::from("closure/bin/build/closurebuilder.py")),
            ..ToolsConfig::default()
        }
    }

    #[test]
    fn test_yui_argument_vector() {
        let stage = yui(&tools_with_jars());
        let command = stage.command();
        assert_eq!(command.program(), Some("java"));
        assert_eq!(
            command.argv("site.css"),
            vec!["-jar", "jars/yui.jar", "--charset", "utf-8", "--type", "css"]
        );
        assert_eq!(command.diagnostics(), DiagnosticPolicy::Fail);
    }

    #[test]
    fn test_yui_unconfigured_names_setting() {
        let fixture = ContextFixture::new(".");
        let stage = yui(&ToolsConfig::default());
        let err = stage.execute(&fixture.ctx(), set_of(&[("a.js", "x")])).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
        assert!(err.to_string().contains("tools.yui_compressor"));
    }

    #[test]
    fn test_sass_load_paths() {
        let mut tools = tools_with_jars();
        tools.sass_load_paths = vec![PathBuf::from("vendor/scss")];
        let stage = sass(&tools, Path::new("static"), "expanded").unwrap();
        assert_eq!(
            stage.command().argv("a.scss"),
            vec!["--stdin", "--style=expanded", "--load-path=static", "--load-path=vendor/scss"]
        );
    }

    #[test]
    fn test_sass_rejects_unknown_style() {
        assert!(sass(&tools_with_jars(), Path::new("."), "nested").is_err());
    }

    #[test]
    fn test_closure_compiler_validates_language() {
        let tools = tools_with_jars();
        assert!(closure_compiler(&tools, "ECMASCRIPT5_STRICT", "SIMPLE_OPTIMIZATIONS").is_ok());
        let err = closure_compiler(&tools, "ECMASCRIPT2099", "SIMPLE_OPTIMIZATIONS").unwrap_err();
        assert!(err.to_string().contains("ECMASCRIPT5_STRICT"));
    }

    #[test]
    fn test_closure_builder_requires_namespace() {
        assert!(closure_builder(&tools_with_jars(), &[], &[]).is_err());
    }

    #[test]
    fn test_closure_builder_argument_vector() {
        let stage = closure_builder(
            &tools_with_jars(),
            &["static/js".to_string()],
            &["app.main".to_string()],
        )
        .unwrap();
        assert_eq!(stage.scope(), ToolScope::WholeSet);
        assert_eq!(stage.command().input_channel(), InputChannel::Arguments);
        assert_eq!(
            stage.command().argv("a.js"),
            vec![
                "closure/bin/build/closurebuilder.py",
                "--output_mode",
                "script",
                "--root",
                "static/js",
                "--namespace",
                "app.main"
            ]
        );
    }
}
