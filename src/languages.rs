use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
#[error("Language `{0}` is not supported")]
pub struct UnsupportedLanguage(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    Python,
    C,
    Cpp,
    Java,
    Html,
    Css,
    TypeScript,
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" => Ok(Language::JavaScript),
            "python" => Ok(Language::Python),
            "c" => Ok(Language::C),
            "cpp" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "html" => Ok(Language::Html),
            "css" => Ok(Language::Css),
            "typescript" => Ok(Language::TypeScript),
            other => Err(UnsupportedLanguage(other.to_string())),
        }
    }
}

/// One external process launch: a program and its argument list. Arguments
/// are passed verbatim, never through a shell.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new(program: &str, args: Vec<String>) -> Self {
        Invocation {
            program: program.to_string(),
            args,
        }
    }
}

/// How a language is executed once its source file is in the scratch
/// directory.
#[derive(Debug, Clone)]
pub enum Recipe {
    Interpret(Invocation),
    CompileThenRun { compile: Invocation, run: Invocation },
    /// No server-side execution; the message is returned as normal output.
    Informational(&'static str),
}

impl Language {
    /// Name of the source file the submitted code is written to. Java is
    /// special-cased because the public class must be named `Main`.
    pub fn source_file(self) -> &'static str {
        match self {
            Language::JavaScript => "code.js",
            Language::Python => "code.py",
            Language::C => "code.c",
            Language::Cpp => "code.cpp",
            Language::Java => "Main.java",
            Language::Html => "index.html",
            Language::Css => "style.css",
            Language::TypeScript => "code.ts",
        }
    }

    pub fn recipe(self, scratch_dir: &Path) -> Recipe {
        let source = scratch_dir
            .join(self.source_file())
            .to_string_lossy()
            .into_owned();
        match self {
            Language::JavaScript => Recipe::Interpret(Invocation::new("node", vec![source])),
            Language::Python => {
                let interpreter = if cfg!(windows) { "python" } else { "python3" };
                Recipe::Interpret(Invocation::new(interpreter, vec![source]))
            }
            Language::C => compile_then_run("gcc", source, scratch_dir),
            Language::Cpp => compile_then_run("g++", source, scratch_dir),
            Language::Java => {
                let dir = scratch_dir.to_string_lossy().into_owned();
                Recipe::CompileThenRun {
                    compile: Invocation::new("javac", vec![source]),
                    run: Invocation::new("java", vec!["-cp".to_string(), dir, "Main".to_string()]),
                }
            }
            Language::Html => Recipe::Informational(
                "HTML has no server-side output. Open the file in a browser to see the result.",
            ),
            Language::Css => Recipe::Informational(
                "CSS has no server-side output. Link the stylesheet from an HTML page to see the result.",
            ),
            Language::TypeScript => Recipe::Informational(
                "TypeScript execution is not supported yet. Transpile to JavaScript and run that instead.",
            ),
        }
    }
}

fn compile_then_run(compiler: &str, source: String, scratch_dir: &Path) -> Recipe {
    let binary = scratch_dir.join("program").to_string_lossy().into_owned();
    Recipe::CompileThenRun {
        compile: Invocation::new(compiler, vec![source, "-o".to_string(), binary.clone()]),
        run: Invocation::new(&binary, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn known_identifiers_parse() {
        for id in ["javascript", "python", "c", "cpp", "java", "html", "css", "typescript"] {
            assert!(id.parse::<Language>().is_ok(), "{id} should parse");
        }
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = "cobol".parse::<Language>().unwrap_err();
        assert!(err.to_string().contains("cobol"));
    }

    #[test]
    fn identifiers_are_case_sensitive() {
        assert!("JavaScript".parse::<Language>().is_err());
    }

    #[test]
    fn interpreted_languages_get_a_single_step() {
        let dir = PathBuf::from("/tmp/scratch");
        match Language::JavaScript.recipe(&dir) {
            Recipe::Interpret(invocation) => {
                assert_eq!(invocation.program, "node");
                assert!(invocation.args[0].ends_with("code.js"));
            }
            _ => panic!("expected an interpret recipe"),
        }
    }

    #[test]
    fn compiled_languages_build_into_the_scratch_dir() {
        let dir = PathBuf::from("/tmp/scratch");
        match Language::C.recipe(&dir) {
            Recipe::CompileThenRun { compile, run } => {
                assert_eq!(compile.program, "gcc");
                assert!(run.program.starts_with("/tmp/scratch"));
            }
            _ => panic!("expected a compile-then-run recipe"),
        }
    }

    #[test]
    fn java_runs_the_main_class() {
        let dir = PathBuf::from("/tmp/scratch");
        match Language::Java.recipe(&dir) {
            Recipe::CompileThenRun { run, .. } => {
                assert_eq!(run.program, "java");
                assert_eq!(run.args.last().map(String::as_str), Some("Main"));
            }
            _ => panic!("expected a compile-then-run recipe"),
        }
    }

    #[test]
    fn markup_languages_are_informational() {
        let dir = PathBuf::from("/tmp/scratch");
        assert!(matches!(Language::Html.recipe(&dir), Recipe::Informational(_)));
        assert!(matches!(Language::Css.recipe(&dir), Recipe::Informational(_)));
        assert!(matches!(
            Language::TypeScript.recipe(&dir),
            Recipe::Informational(_)
        ));
    }
}
