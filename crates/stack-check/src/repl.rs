use crate::config::{history_path, Config};
use crate::diagnostics::render_human;
use crate::error::{ParseErrors, StackError};
use crate::parser::Parser;
use crate::verifier::{Verifier, VerifyOptions};
use crate::{Source, StreamFormat};
use miette::{MietteHandlerOpts, Report};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result};
use std::path::Path;

enum CmdResult {
    Exit,
    Continue,
}

const HELP: &str = "\
help            show this help
quit            leave the session
load <file>     verify a stream file into the session
state           dump live containers, bindings and borrows
reset           start over with an empty session
<statement>     verify one statement, e.g. `declare X: int owned`";

const REPL_SOURCE: &str = "<repl>";

/// An incremental verification session.
///
/// Every evaluated line is kept in `buffer`, so diagnostics can point back
/// at statements entered earlier in the session.
pub struct Session {
    verifier: Verifier,
    config: Config,
    buffer: String,
    lines: usize,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            verifier: Verifier::new(options(&config)),
            config,
            buffer: String::new(),
            lines: 0,
        }
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Everything evaluated so far, one statement line per line.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.verifier = Verifier::new(options(&self.config));
        self.buffer.clear();
        self.lines = 0;
    }

    /// Parses and verifies one line. Returns rendered diagnostics, or an
    /// empty string when the line was accepted.
    pub fn eval(&mut self, line: &str) -> std::result::Result<String, StackError> {
        let line = line.trim_end_matches(['\r', '\n']);
        self.lines += 1;
        let offset = self.buffer.len();
        self.buffer.push_str(line);
        self.buffer.push('\n');
        let ops = Parser::new(line)
            .with_limit(self.config.error_limit)
            .starting_at(self.lines, offset)
            .parse()
            .map_err(|errors| ParseErrors::new(REPL_SOURCE, self.buffer.as_str(), errors))?;
        let mut diagnostics = Vec::new();
        for node in &ops {
            diagnostics.extend(self.verifier.step(node).iter().cloned());
        }
        Ok(render_human(&diagnostics, REPL_SOURCE, &self.buffer, 0, self.config.color))
    }

    /// Verifies every statement of a file into the session. Text files join
    /// the session buffer; JSON streams keep their own locations.
    pub fn load(&mut self, path: &Path) -> std::result::Result<String, StackError> {
        let source = Source::from_file(path)?;
        let (ops, name, code) = match source.format {
            StreamFormat::Text => {
                let parsed = Parser::new(&source.code)
                    .with_limit(self.config.error_limit)
                    .starting_at(self.lines + 1, self.buffer.len())
                    .parse();
                let mut code = self.buffer.clone();
                code.push_str(&source.code);
                if !code.ends_with('\n') {
                    code.push('\n');
                }
                let ops = parsed.map_err(|errors| ParseErrors::new(&source.name, code.as_str(), errors))?;
                self.lines += source.code.lines().count();
                self.buffer = code;
                (ops, REPL_SOURCE, self.buffer.as_str())
            }
            StreamFormat::Json => (source.parse(self.config.error_limit)?, source.name.as_str(), source.code.as_str()),
        };
        let mut diagnostics = Vec::new();
        for node in &ops {
            diagnostics.extend(self.verifier.step(node).iter().cloned());
        }
        Ok(format!(
            "{}loaded {} operation(s) from {}",
            render_human(&diagnostics, name, code, self.config.error_limit, self.config.color),
            ops.len(),
            source.name
        ))
    }
}

fn options(config: &Config) -> VerifyOptions {
    VerifyOptions {
        warnings_as_errors: config.warnings_as_errors,
    }
}

fn try_command(line: &str, session: &mut Session) -> CmdResult {
    let words = line.split_whitespace().collect::<Vec<&str>>();
    if words.is_empty() {
        return CmdResult::Continue;
    }
    match words[0] {
        "help" => {
            println!("{}", HELP);
            CmdResult::Continue
        }
        "q" | "quit" => CmdResult::Exit,
        "load" => {
            if words.len() == 2 {
                match session.load(Path::new(words[1])) {
                    Ok(out) => println!("{}", out),
                    Err(error) => print_miette_error(error),
                }
            } else {
                eprintln!("Usage: load <filename>");
            }
            CmdResult::Continue
        }
        "state" => {
            print!("{}", session.verifier().dump_state());
            CmdResult::Continue
        }
        "reset" => {
            session.reset();
            CmdResult::Continue
        }
        _ => {
            match session.eval(line) {
                Ok(out) => print!("{}", out),
                Err(error) => print_miette_error(error),
            }
            CmdResult::Continue
        }
    }
}

fn print_miette_error(err: StackError) {
    let report = Report::new(err);

    miette::set_hook(Box::new(|_| {
        Box::new(MietteHandlerOpts::new().terminal_links(true).build())
    }))
    .ok();

    eprintln!("{:?}", report);
}

pub fn main_loop(config: Config) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    #[cfg(feature = "with-file-history")]
    if config.file_history && rl.load_history(&history).is_err() {
        println!("No previous history");
    }
    let file_history = config.file_history;
    let mut session = Session::new(config);
    loop {
        let readline = rl.readline("stk> ");
        match readline {
            Ok(line) => {
                if rl.add_history_entry(line.as_str()).is_err() {
                    println!("Unable to add history");
                    break;
                }
                match try_command(&line, &mut session) {
                    CmdResult::Exit => break,
                    CmdResult::Continue => continue,
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    #[cfg(feature = "with-file-history")]
    if file_history {
        rl.save_history(&history)?;
    }
    Ok(())
}
