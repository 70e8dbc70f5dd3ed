//! In-process interpreter for action scripts.
//!
//! Scripts run inside the server process rather than under `/bin/sh`, so
//! every external command goes through the same spawn path as `run` actions:
//! identical process attributes, identical output capture, identical
//! cancellation behavior.
//!
//! Supported syntax: command sequences (newlines, `;`), `&&` and `||`,
//! single/double quotes and backslash escapes, `$VAR` / `${VAR}` expansion,
//! leading `NAME=value` assignments, `#` comments, and the `cd`, `export`
//! and `exit` builtins. Pipes, redirection, subshells, command substitution,
//! globs and background jobs are rejected at parse time.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::Chars;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::exec::{status_code, wait_with_cancel, CancelMode, KILL_TIMEOUT};
use super::proc::ProcAttrs;
use super::ActionError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script parse error: {0}")]
    Parse(String),
}

#[derive(Debug)]
pub(crate) struct Script {
    lists: Vec<AndOrList>,
}

#[derive(Debug)]
struct AndOrList {
    first: SimpleCommand,
    rest: Vec<(Connector, SimpleCommand)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

#[derive(Debug)]
struct SimpleCommand {
    words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
    parts: Vec<WordPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WordPart {
    /// Unquoted text; the only place an assignment `NAME=` may appear.
    Literal(String),
    /// Quoted text, exempt from assignment detection.
    Quoted(String),
    Var(String),
}

enum Token {
    Word(Word),
    And,
    Or,
    Seq,
}

pub(crate) fn parse(source: &str) -> Result<Script, ScriptError> {
    let tokens = lex(source)?;

    let mut lists = Vec::new();
    let mut chain: Option<AndOrList> = None;
    let mut connector: Option<Connector> = None;
    let mut words: Vec<Word> = Vec::new();

    let attach = |chain: &mut Option<AndOrList>,
                  connector: &mut Option<Connector>,
                  words: &mut Vec<Word>| {
        let command = SimpleCommand {
            words: std::mem::take(words),
        };
        match chain.take() {
            None => {
                *chain = Some(AndOrList {
                    first: command,
                    rest: Vec::new(),
                });
            }
            Some(mut list) => {
                // two commands without a separator cannot be produced by the lexer
                let conn = connector.take().expect("command chained without connector");
                list.rest.push((conn, command));
                *chain = Some(list);
            }
        }
    };

    for token in tokens {
        match token {
            Token::Word(word) => words.push(word),
            Token::And | Token::Or => {
                if words.is_empty() {
                    return Err(ScriptError::Parse(
                        "expected a command before '&&' / '||'".to_string(),
                    ));
                }
                let conn = if matches!(token, Token::And) {
                    Connector::And
                } else {
                    Connector::Or
                };
                attach(&mut chain, &mut connector, &mut words);
                connector = Some(conn);
            }
            Token::Seq => {
                if !words.is_empty() {
                    attach(&mut chain, &mut connector, &mut words);
                } else if connector.is_some() {
                    return Err(ScriptError::Parse(
                        "expected a command after '&&' / '||'".to_string(),
                    ));
                }
                if let Some(list) = chain.take() {
                    lists.push(list);
                }
            }
        }
    }

    if !words.is_empty() {
        attach(&mut chain, &mut connector, &mut words);
    } else if connector.is_some() {
        return Err(ScriptError::Parse(
            "expected a command after '&&' / '||'".to_string(),
        ));
    }
    if let Some(list) = chain.take() {
        lists.push(list);
    }

    Ok(Script { lists })
}

fn lex(source: &str) -> Result<Vec<Token>, ScriptError> {
    let mut chars = source.chars().peekable();
    let mut tokens = Vec::new();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' | ';' => {
                chars.next();
                tokens.push(Token::Seq);
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    return Err(unsupported("background jobs ('&')"));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    return Err(unsupported("pipes ('|')"));
                }
            }
            '<' | '>' => return Err(unsupported("redirection ('<', '>')")),
            '(' | ')' => return Err(unsupported("subshells")),
            '`' => return Err(unsupported("command substitution")),
            _ => tokens.push(Token::Word(lex_word(&mut chars)?)),
        }
    }
    Ok(tokens)
}

fn unsupported(what: &str) -> ScriptError {
    ScriptError::Parse(format!("{what} are not supported in action scripts"))
}

fn lex_word(chars: &mut Peekable<Chars<'_>>) -> Result<Word, ScriptError> {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut literal = String::new();

    fn flush(literal: &mut String, parts: &mut Vec<WordPart>) {
        if !literal.is_empty() {
            parts.push(WordPart::Literal(std::mem::take(literal)));
        }
    }

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' | ';' | '&' | '|' => break,
            '<' | '>' => return Err(unsupported("redirection ('<', '>')")),
            '(' | ')' => return Err(unsupported("subshells")),
            '`' => return Err(unsupported("command substitution")),
            '*' | '?' | '[' => return Err(unsupported("glob patterns")),
            '\'' => {
                chars.next();
                flush(&mut literal, &mut parts);
                let mut quoted = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => quoted.push(c),
                        None => {
                            return Err(ScriptError::Parse(
                                "unterminated single quote".to_string(),
                            ))
                        }
                    }
                }
                parts.push(WordPart::Quoted(quoted));
            }
            '"' => {
                chars.next();
                flush(&mut literal, &mut parts);
                let mut quoted = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => quoted.push(c),
                            Some(c) => {
                                quoted.push('\\');
                                quoted.push(c);
                            }
                            None => {
                                return Err(ScriptError::Parse(
                                    "unterminated double quote".to_string(),
                                ))
                            }
                        },
                        Some('$') => {
                            if !quoted.is_empty() {
                                parts.push(WordPart::Quoted(std::mem::take(&mut quoted)));
                            }
                            match lex_var(chars)? {
                                Some(part) => parts.push(part),
                                None => quoted.push('$'),
                            }
                        }
                        Some(c) => quoted.push(c),
                        None => {
                            return Err(ScriptError::Parse(
                                "unterminated double quote".to_string(),
                            ))
                        }
                    }
                }
                // an empty pair of quotes still produces a (quoted) part
                parts.push(WordPart::Quoted(quoted));
            }
            '\\' => {
                chars.next();
                match chars.next() {
                    Some(c) => literal.push(c),
                    None => literal.push('\\'),
                }
            }
            '$' => {
                chars.next();
                match lex_var(chars)? {
                    Some(part) => {
                        flush(&mut literal, &mut parts);
                        parts.push(part);
                    }
                    None => literal.push('$'),
                }
            }
            _ => {
                literal.push(c);
                chars.next();
            }
        }
    }

    flush(&mut literal, &mut parts);
    Ok(Word { parts })
}

/// `{NAME}` or a bare NAME; the leading `$` was already consumed. A lone `$`
/// yields None and stays literal.
fn lex_var(chars: &mut Peekable<Chars<'_>>) -> Result<Option<WordPart>, ScriptError> {
    match chars.peek() {
        Some('{') => {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) if is_var_char(c) => name.push(c),
                    Some(c) => {
                        return Err(ScriptError::Parse(format!(
                            "invalid character '{c}' in ${{...}} expansion"
                        )))
                    }
                    None => {
                        return Err(ScriptError::Parse(
                            "unterminated ${...} expansion".to_string(),
                        ))
                    }
                }
            }
            if name.is_empty() {
                return Err(ScriptError::Parse("empty ${} expansion".to_string()));
            }
            Ok(Some(WordPart::Var(name)))
        }
        Some('(') => Err(unsupported("command substitution")),
        Some(&c) if is_var_start(c) => {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if is_var_char(c) {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            Ok(Some(WordPart::Var(name)))
        }
        _ => Ok(None),
    }
}

fn is_var_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse and evaluate a script; the final status becomes the action result.
pub(crate) async fn execute_script(
    source: &str,
    cwd: Option<&str>,
    attrs: ProcAttrs,
    capture: File,
    cancel: &CancellationToken,
) -> Result<(), ActionError> {
    let script = parse(source)?;
    let mut interp = Interp::new(cwd, attrs, capture)?;

    for list in &script.lists {
        if let Flow::Exit(status) = interp.run_list(list, cancel).await? {
            interp.last_status = status;
            break;
        }
    }

    match interp.last_status {
        0 => Ok(()),
        status => Err(ActionError::ExitStatus(status)),
    }
}

enum Flow {
    Continue,
    Exit(i32),
}

struct Interp {
    vars: HashMap<String, String>,
    exported: HashSet<String>,
    cwd: PathBuf,
    attrs: ProcAttrs,
    capture: File,
    last_status: i32,
}

impl Interp {
    fn new(cwd: Option<&str>, attrs: ProcAttrs, capture: File) -> Result<Self, ActionError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let exported = vars.keys().cloned().collect();
        let cwd = match cwd {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir()?,
        };
        Ok(Self {
            vars,
            exported,
            cwd,
            attrs,
            capture,
            last_status: 0,
        })
    }

    async fn run_list(
        &mut self,
        list: &AndOrList,
        cancel: &CancellationToken,
    ) -> Result<Flow, ActionError> {
        if let Flow::Exit(status) = self.run_command(&list.first, cancel).await? {
            return Ok(Flow::Exit(status));
        }
        for (connector, command) in &list.rest {
            let run = match connector {
                Connector::And => self.last_status == 0,
                Connector::Or => self.last_status != 0,
            };
            if !run {
                continue;
            }
            if let Flow::Exit(status) = self.run_command(command, cancel).await? {
                return Ok(Flow::Exit(status));
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_command(
        &mut self,
        command: &SimpleCommand,
        cancel: &CancellationToken,
    ) -> Result<Flow, ActionError> {
        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled);
        }

        // Split leading NAME=value assignments from the argv.
        let mut assignments: Vec<(String, String)> = Vec::new();
        let mut argv: Vec<String> = Vec::new();
        for word in &command.words {
            if argv.is_empty() {
                if let Some((name, value)) = self.word_assignment(word) {
                    assignments.push((name, value));
                    continue;
                }
            }
            argv.push(self.expand(word));
        }

        if argv.is_empty() {
            for (name, value) in assignments {
                self.vars.insert(name, value);
            }
            self.last_status = 0;
            return Ok(Flow::Continue);
        }

        match argv[0].as_str() {
            "cd" => {
                self.last_status = self.builtin_cd(argv.get(1).map(String::as_str));
                Ok(Flow::Continue)
            }
            "export" => {
                self.last_status = self.builtin_export(&argv[1..]);
                Ok(Flow::Continue)
            }
            "exit" => {
                let status = argv
                    .get(1)
                    .and_then(|s| s.parse::<i32>().ok())
                    .unwrap_or(self.last_status);
                Ok(Flow::Exit(status))
            }
            _ => {
                self.run_external(&argv, &assignments, cancel).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn run_external(
        &mut self,
        argv: &[String],
        assignments: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let mut env: HashMap<String, String> = self
            .vars
            .iter()
            .filter(|(name, _)| self.exported.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, value) in assignments {
            env.insert(name.clone(), value.clone());
        }

        let path_var = env.get("PATH").cloned().unwrap_or_default();
        let Some(program) = resolve_program(&argv[0], &self.cwd, &path_var) else {
            self.report(&format!("command not found: {}", argv[0]));
            self.last_status = 127;
            return Ok(());
        };

        let mut cmd = Command::new(&program);
        cmd.args(&argv[1..])
            .current_dir(&self.cwd)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(self.capture.try_clone()?))
            .stderr(Stdio::from(self.capture.try_clone()?));
        self.attrs.apply(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.report(&format!("{}: {err}", argv[0]));
                self.last_status = 127;
                return Ok(());
            }
        };

        let (status, cancelled) =
            wait_with_cancel(&mut child, cancel, CancelMode::InterruptThenKill(KILL_TIMEOUT))
                .await?;
        if cancelled && !status.success() {
            return Err(ActionError::Cancelled);
        }
        self.last_status = status_code(status);
        Ok(())
    }

    fn builtin_cd(&mut self, dir: Option<&str>) -> i32 {
        let target = match dir {
            Some(dir) if !dir.is_empty() => self.cwd.join(dir),
            _ => match self.vars.get("HOME") {
                Some(home) if !home.is_empty() => PathBuf::from(home),
                _ => {
                    self.report("cd: HOME not set");
                    return 1;
                }
            },
        };
        match std::fs::canonicalize(&target) {
            Ok(path) if path.is_dir() => {
                self.cwd = path;
                0
            }
            Ok(_) => {
                self.report(&format!("cd: not a directory: {}", target.display()));
                1
            }
            Err(err) => {
                self.report(&format!("cd: {}: {err}", target.display()));
                1
            }
        }
    }

    fn builtin_export(&mut self, args: &[String]) -> i32 {
        for arg in args {
            if let Some((name, value)) = split_assignment(arg) {
                self.vars.insert(name.to_string(), value.to_string());
                self.exported.insert(name.to_string());
            } else if arg.chars().next().is_some_and(is_var_start) && arg.chars().all(is_var_char)
            {
                self.exported.insert(arg.clone());
            } else {
                self.report(&format!("export: invalid name: {arg}"));
                return 1;
            }
        }
        0
    }

    /// `NAME=` must open the word unquoted; the value may mix any parts.
    fn word_assignment(&self, word: &Word) -> Option<(String, String)> {
        let WordPart::Literal(text) = word.parts.first()? else {
            return None;
        };
        let (name, tail) = text.split_once('=')?;
        if name.is_empty()
            || !name.chars().next().is_some_and(is_var_start)
            || !name.chars().all(is_var_char)
        {
            return None;
        }
        let mut value = tail.to_string();
        for part in &word.parts[1..] {
            value.push_str(&self.expand_part(part));
        }
        Some((name.to_string(), value))
    }

    fn expand(&self, word: &Word) -> String {
        word.parts.iter().map(|part| self.expand_part(part)).collect()
    }

    fn expand_part(&self, part: &WordPart) -> String {
        match part {
            WordPart::Literal(s) | WordPart::Quoted(s) => s.clone(),
            WordPart::Var(name) => self.vars.get(name).cloned().unwrap_or_default(),
        }
    }

    /// Interpreter diagnostics go to the same capture file as command output.
    fn report(&self, message: &str) {
        let _ = writeln!(&self.capture, "hookpipe: {message}");
    }
}

fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    if name.is_empty() || !name.chars().next().is_some_and(is_var_start) {
        return None;
    }
    if !name.chars().all(is_var_char) {
        return None;
    }
    Some((name, value))
}

fn resolve_program(name: &str, cwd: &Path, path_var: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let candidate = cwd.join(name);
        return is_executable(&candidate).then_some(candidate);
    }
    for dir in path_var.split(':') {
        if dir.is_empty() {
            continue;
        }
        let candidate = Path::new(dir).join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_texts(command: &SimpleCommand) -> Vec<String> {
        command
            .words
            .iter()
            .map(|w| {
                w.parts
                    .iter()
                    .map(|p| match p {
                        WordPart::Literal(s) | WordPart::Quoted(s) => s.clone(),
                        WordPart::Var(name) => format!("${name}"),
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn parses_simple_command() {
        let script = parse("echo hello world").expect("parses");
        assert_eq!(script.lists.len(), 1);
        assert_eq!(
            word_texts(&script.lists[0].first),
            vec!["echo", "hello", "world"]
        );
    }

    #[test]
    fn parses_sequences_and_connectors() {
        let script = parse("make build && make test || echo failed\necho done").expect("parses");
        assert_eq!(script.lists.len(), 2);
        let chain = &script.lists[0];
        assert_eq!(chain.rest.len(), 2);
        assert_eq!(chain.rest[0].0, Connector::And);
        assert_eq!(chain.rest[1].0, Connector::Or);
    }

    #[test]
    fn quoting_preserves_spaces_and_marks_parts() {
        let script = parse(r#"echo 'a b' "c $X d" e\ f"#).expect("parses");
        let words = &script.lists[0].first.words;
        assert_eq!(words[1].parts, vec![WordPart::Quoted("a b".to_string())]);
        assert_eq!(
            words[2].parts,
            vec![
                WordPart::Quoted("c ".to_string()),
                WordPart::Var("X".to_string()),
                WordPart::Quoted(" d".to_string()),
            ]
        );
        assert_eq!(words[3].parts, vec![WordPart::Literal("e f".to_string())]);
    }

    #[test]
    fn parses_braced_and_bare_variables() {
        let script = parse("echo $FOO ${BAR_1}baz").expect("parses");
        let words = &script.lists[0].first.words;
        assert_eq!(words[1].parts, vec![WordPart::Var("FOO".to_string())]);
        assert_eq!(
            words[2].parts,
            vec![
                WordPart::Var("BAR_1".to_string()),
                WordPart::Literal("baz".to_string()),
            ]
        );
    }

    #[test]
    fn comments_are_ignored() {
        let script = parse("# header\necho hi\n").expect("parses");
        assert_eq!(script.lists.len(), 1);
    }

    #[test]
    fn rejects_unsupported_syntax() {
        for source in [
            "cat file | grep x",
            "echo hi > out.txt",
            "echo `date`",
            "(cd /tmp)",
            "sleep 5 &",
            "echo $(date)",
            "rm -rf build/*",
        ] {
            assert!(parse(source).is_err(), "should reject: {source}");
        }
    }

    #[test]
    fn rejects_dangling_connectors() {
        assert!(parse("echo hi &&").is_err());
        assert!(parse("&& echo hi").is_err());
        assert!(parse("echo a &&\necho b").is_err());
    }

    #[test]
    fn rejects_unterminated_quotes() {
        assert!(parse("echo 'oops").is_err());
        assert!(parse("echo \"oops").is_err());
    }

    #[test]
    fn assignment_detection() {
        assert_eq!(split_assignment("FOO=bar"), Some(("FOO", "bar")));
        assert_eq!(split_assignment("_X=1"), Some(("_X", "1")));
        assert_eq!(split_assignment("1X=bad"), None);
        assert_eq!(split_assignment("not-an-assignment"), None);
    }

    #[cfg(unix)]
    mod exec {
        use super::*;
        use std::io::{Read, Seek, SeekFrom};

        async fn run(source: &str) -> (Result<(), ActionError>, String) {
            let mut capture = tempfile::tempfile().expect("tempfile");
            let cancel = CancellationToken::new();
            let result = execute_script(
                source,
                None,
                ProcAttrs::default(),
                capture.try_clone().expect("clone"),
                &cancel,
            )
            .await;
            let mut output = String::new();
            capture.seek(SeekFrom::Start(0)).expect("seek");
            capture.read_to_string(&mut output).expect("read");
            (result, output)
        }

        #[tokio::test]
        async fn echo_writes_to_capture() {
            let (result, output) = run("echo hello").await;
            assert!(result.is_ok());
            assert_eq!(output, "hello\n");
        }

        #[tokio::test]
        async fn variables_expand() {
            let (result, output) = run("GREETING='hi there'; echo \"$GREETING\"").await;
            assert!(result.is_ok());
            assert_eq!(output, "hi there\n");
        }

        #[tokio::test]
        async fn command_prefix_assignment_does_not_persist() {
            let (result, output) = run("FOO=abc true; echo \"[$FOO]\"").await;
            assert!(result.is_ok());
            assert_eq!(output, "[]\n");
        }

        #[tokio::test]
        async fn and_or_short_circuit() {
            let (result, output) =
                run("false && echo skipped; true || echo also-skipped; false || echo rescued")
                    .await;
            assert!(result.is_ok(), "final status is 0: {result:?}");
            assert_eq!(output, "rescued\n");
        }

        #[tokio::test]
        async fn failing_tail_command_is_the_action_error() {
            let (result, _) = run("echo fine; false").await;
            match result {
                Err(ActionError::ExitStatus(1)) => {}
                other => panic!("expected exit status 1, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn unknown_command_exits_127() {
            let (result, output) = run("definitely-not-a-command-4242").await;
            match result {
                Err(ActionError::ExitStatus(127)) => {}
                other => panic!("expected exit status 127, got {other:?}"),
            }
            assert!(output.contains("command not found"));
        }

        #[tokio::test]
        async fn exit_builtin_stops_the_script() {
            let (result, output) = run("echo before; exit 3; echo after").await;
            match result {
                Err(ActionError::ExitStatus(3)) => {}
                other => panic!("expected exit status 3, got {other:?}"),
            }
            assert_eq!(output, "before\n");
        }

        #[tokio::test]
        async fn cd_builtin_changes_directory_for_children() {
            let dir = tempfile::tempdir().expect("tempdir");
            let script = format!("cd {}; pwd", dir.path().display());
            let (result, output) = run(&script).await;
            assert!(result.is_ok());
            let canonical = dir.path().canonicalize().expect("canonicalize");
            assert_eq!(output.trim(), canonical.display().to_string());
        }

        #[tokio::test]
        async fn export_controls_child_environment() {
            let (result, output) =
                run("HIDDEN=nope; export SHOWN=yes; sh -c 'echo \"$SHOWN:$HIDDEN\"'").await;
            assert!(result.is_ok());
            assert_eq!(output, "yes:\n");
        }

        #[tokio::test]
        async fn parse_errors_surface_before_running_anything() {
            let (result, output) = run("echo started; cat x | grep y").await;
            assert!(matches!(result, Err(ActionError::Script(_))));
            assert_eq!(output, "", "nothing should run on a parse error");
        }
    }
}
