//! Text directive parsing
//!
//! A directive is one line: a verb followed by arguments. Arguments may be
//! quoted with `"` or `'`; free-text arguments (reasons, feedback, notes)
//! take the rest of the line.

use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};

/// Directives accepted by the interpreter, with their usage line.
pub const USAGE: &[(&str, &str)] = &[
    ("continue", "run the next unit or settle the gate and advance"),
    ("status", "show the current state (read-only)"),
    ("approve-gate", "approve the active human gate"),
    ("request-changes <feedback>", "reject the active human gate with feedback"),
    ("pause [note]", "record a suspend point"),
    ("skip-unit <unit> <reason>", "skip a unit of the active phase"),
    ("skip-gate <reason> [--override]", "waive the active gate (--override for required gates)"),
    ("jump-phase <phase> [--override]", "move to another phase"),
    ("add-unit <unit> [deliverable...]", "append a follow-up unit to the active phase"),
    ("force-pass <reason>", "force a conditional gate to pass"),
    ("force-reject <reason>", "force a conditional gate to reject"),
    ("help", "list directives"),
];

const OVERRIDE_FLAG: &str = "--override";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Continue,
    Status,
    ApproveGate,
    RequestChanges { feedback: String },
    Pause { note: Option<String> },
    SkipUnit { unit: String, reason: String },
    SkipGate { reason: String, override_required: bool },
    JumpPhase { phase: String, override_rules: bool },
    AddUnit { unit: String, deliverables: Vec<String> },
    ForcePass { reason: String },
    ForceReject { reason: String },
    Help,
}

impl Directive {
    /// Parse one directive line.
    pub fn parse(input: &str) -> EngineResult<Self> {
        let tokens = tokenize(input)?;
        let Some((verb, args)) = tokens.split_first() else {
            return Err(malformed("empty directive"));
        };

        let (args, override_flag) = take_override(args);
        let directive = match verb.to_lowercase().as_str() {
            "continue" | "next" => {
                no_args(verb, &args)?;
                Directive::Continue
            }
            "status" => {
                no_args(verb, &args)?;
                Directive::Status
            }
            "approve-gate" | "approve" => {
                no_args(verb, &args)?;
                Directive::ApproveGate
            }
            "request-changes" => Directive::RequestChanges {
                feedback: rest(verb, &args, "feedback")?,
            },
            "pause" => Directive::Pause {
                note: (!args.is_empty()).then(|| args.join(" ")),
            },
            "skip-unit" => {
                let (unit, tail) = first(verb, &args, "unit")?;
                Directive::SkipUnit {
                    unit,
                    reason: rest(verb, tail, "reason")?,
                }
            }
            "skip-gate" => Directive::SkipGate {
                reason: rest(verb, &args, "reason")?,
                override_required: override_flag,
            },
            "jump-phase" | "jump" => {
                let (phase, tail) = first(verb, &args, "phase")?;
                no_args(verb, tail)?;
                Directive::JumpPhase {
                    phase,
                    override_rules: override_flag,
                }
            }
            "add-unit" => {
                let (unit, tail) = first(verb, &args, "unit")?;
                Directive::AddUnit {
                    unit,
                    deliverables: tail.to_vec(),
                }
            }
            "force-pass" => Directive::ForcePass {
                reason: rest(verb, &args, "reason")?,
            },
            "force-reject" => Directive::ForceReject {
                reason: rest(verb, &args, "reason")?,
            },
            "help" | "?" => Directive::Help,
            other => return Err(malformed(format!("unknown directive '{other}'"))),
        };

        if override_flag && !directive.accepts_override() {
            return Err(malformed(format!("'{verb}' does not take {OVERRIDE_FLAG}")));
        }
        Ok(directive)
    }

    /// `status` and `help` never write.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Directive::Status | Directive::Help)
    }

    fn accepts_override(&self) -> bool {
        matches!(self, Directive::SkipGate { .. } | Directive::JumpPhase { .. })
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Directive::Continue => "continue",
            Directive::Status => "status",
            Directive::ApproveGate => "approve-gate",
            Directive::RequestChanges { .. } => "request-changes",
            Directive::Pause { .. } => "pause",
            Directive::SkipUnit { .. } => "skip-unit",
            Directive::SkipGate { .. } => "skip-gate",
            Directive::JumpPhase { .. } => "jump-phase",
            Directive::AddUnit { .. } => "add-unit",
            Directive::ForcePass { .. } => "force-pass",
            Directive::ForceReject { .. } => "force-reject",
            Directive::Help => "help",
        }
    }
}

impl FromStr for Directive {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Directive::parse(s)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())?;
        match self {
            Directive::RequestChanges { feedback } => write!(f, " {}", quote(feedback)),
            Directive::Pause { note: Some(note) } => write!(f, " {}", quote(note)),
            Directive::SkipUnit { unit, reason } => write!(f, " {unit} {}", quote(reason)),
            Directive::SkipGate {
                reason,
                override_required,
            } => {
                write!(f, " {}", quote(reason))?;
                if *override_required {
                    write!(f, " {OVERRIDE_FLAG}")?;
                }
                Ok(())
            }
            Directive::JumpPhase {
                phase,
                override_rules,
            } => {
                write!(f, " {phase}")?;
                if *override_rules {
                    write!(f, " {OVERRIDE_FLAG}")?;
                }
                Ok(())
            }
            Directive::AddUnit { unit, deliverables } => {
                write!(f, " {unit}")?;
                for d in deliverables {
                    write!(f, " {}", quote(d))?;
                }
                Ok(())
            }
            Directive::ForcePass { reason } | Directive::ForceReject { reason } => {
                write!(f, " {}", quote(reason))
            }
            _ => Ok(()),
        }
    }
}

/// The directive list shown by `help` and attached to parse errors.
pub fn guidance() -> String {
    let width = USAGE.iter().map(|(u, _)| u.len()).max().unwrap_or(0);
    let mut text = String::from("Directives:\n");
    for (usage, about) in USAGE {
        text.push_str(&format!("  {usage:<width$}  {about}\n"));
    }
    text
}

fn malformed(message: impl Into<String>) -> EngineError {
    EngineError::MalformedDirective {
        message: message.into(),
        guidance: guidance(),
    }
}

fn quote(text: &str) -> String {
    let needs_quotes =
        text.is_empty() || text.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if needs_quotes {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text.to_string()
    }
}

fn take_override(args: &[String]) -> (Vec<String>, bool) {
    let found = args.iter().any(|a| a == OVERRIDE_FLAG);
    let rest = args
        .iter()
        .filter(|a| *a != OVERRIDE_FLAG)
        .cloned()
        .collect();
    (rest, found)
}

fn no_args(verb: &str, args: &[String]) -> EngineResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(malformed(format!(
            "'{verb}' takes no arguments (got '{}')",
            args.join(" ")
        )))
    }
}

fn first<'a>(verb: &str, args: &'a [String], what: &str) -> EngineResult<(String, &'a [String])> {
    match args.split_first() {
        Some((head, tail)) => Ok((head.clone(), tail)),
        None => Err(malformed(format!("'{verb}' requires a {what}"))),
    }
}

fn rest(verb: &str, args: &[String], what: &str) -> EngineResult<String> {
    let text = args.join(" ");
    let text = text.trim();
    if text.is_empty() {
        return Err(malformed(format!("'{verb}' requires a {what}")));
    }
    Ok(text.to_string())
}

/// Split on whitespace, keeping quoted runs together.
fn tokenize(input: &str) -> EngineResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = input.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            // inside double quotes, \" and \\ stand for the character itself
            Some('"') if c == '\\' && matches!(chars.peek(), Some('"' | '\\')) => {
                current.extend(chars.next());
            }
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(malformed(format!("unterminated {q} quote")));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_verbs() {
        assert_eq!(Directive::parse("continue").unwrap(), Directive::Continue);
        assert_eq!(Directive::parse("  STATUS ").unwrap(), Directive::Status);
        assert_eq!(
            Directive::parse("approve-gate").unwrap(),
            Directive::ApproveGate
        );
        assert_eq!(Directive::parse("help").unwrap(), Directive::Help);
    }

    #[test]
    fn test_free_text_takes_rest_of_line() {
        assert_eq!(
            Directive::parse("request-changes add error states to the mockups").unwrap(),
            Directive::RequestChanges {
                feedback: "add error states to the mockups".into()
            }
        );
        assert_eq!(
            Directive::parse("skip-unit risks \"covered in kickoff\"").unwrap(),
            Directive::SkipUnit {
                unit: "risks".into(),
                reason: "covered in kickoff".into()
            }
        );
        assert_eq!(
            Directive::parse("pause").unwrap(),
            Directive::Pause { note: None }
        );
    }

    #[test]
    fn test_override_flag() {
        assert_eq!(
            Directive::parse("skip-gate --override legal signed off").unwrap(),
            Directive::SkipGate {
                reason: "legal signed off".into(),
                override_required: true
            }
        );
        assert_eq!(
            Directive::parse("jump-phase release --override").unwrap(),
            Directive::JumpPhase {
                phase: "release".into(),
                override_rules: true
            }
        );
        assert!(Directive::parse("force-pass --override flaky").is_err());
    }

    #[test]
    fn test_add_unit_deliverables() {
        assert_eq!(
            Directive::parse("add-unit a11y-audit audit.md 'screen reader notes'").unwrap(),
            Directive::AddUnit {
                unit: "a11y-audit".into(),
                deliverables: vec!["audit.md".into(), "screen reader notes".into()]
            }
        );
    }

    #[test]
    fn test_malformed_directives_carry_guidance() {
        for input in [
            "",
            "launch",
            "request-changes",
            "skip-unit risks",
            "jump-phase",
            "jump-phase a b",
            "status now",
            "skip-gate \"unterminated",
        ] {
            match Directive::parse(input) {
                Err(EngineError::MalformedDirective { guidance, .. }) => {
                    assert!(guidance.contains("approve-gate"), "{input}")
                }
                other => panic!("expected malformed directive for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_display_parses_back() {
        let directives = [
            Directive::SkipGate {
                reason: "no reviewer available".into(),
                override_required: true,
            },
            Directive::AddUnit {
                unit: "docs".into(),
                deliverables: vec!["README.md".into()],
            },
            Directive::Pause {
                note: Some("waiting on vendor".into()),
            },
        ];
        for directive in directives {
            assert_eq!(Directive::parse(&directive.to_string()).unwrap(), directive);
        }
    }

    #[test]
    fn test_display_keeps_quotes_and_backslashes() {
        let directives = [
            Directive::RequestChanges {
                feedback: r#"rename "Save" to 'Submit'"#.into(),
            },
            Directive::SkipUnit {
                unit: "risks".into(),
                reason: r"see C:\notes\risks.md".into(),
            },
            Directive::AddUnit {
                unit: "copy".into(),
                deliverables: vec!["don't.md".into(), r#"say "hi""#.into()],
            },
            Directive::Pause {
                note: Some(r#"ends with \"#.into()),
            },
        ];
        for directive in directives {
            let line = directive.to_string();
            assert_eq!(Directive::parse(&line).unwrap(), directive, "{line}");
        }
    }

    #[test]
    fn test_escaped_quote_inside_double_quotes() {
        assert_eq!(
            Directive::parse(r#"request-changes "say \"no\" twice""#).unwrap(),
            Directive::RequestChanges {
                feedback: r#"say "no" twice"#.into()
            }
        );
        // single quotes take everything literally
        assert_eq!(
            Directive::parse(r"skip-unit risks 'a\b'").unwrap(),
            Directive::SkipUnit {
                unit: "risks".into(),
                reason: r"a\b".into()
            }
        );
    }
}
