//! Interaction port: the engine's only channel to a human
//!
//! A narrow callback surface with exactly four operations: `ask` pre-flight
//! questions (blocking, ordered, all-or-nothing), `announce` progress,
//! `report_violations`, and `remediate` after a governance failure. Two
//! bindings ship with the crate: an interactive terminal binding and a
//! scripted binding for tests and pre-answered runs. A scripted binding
//! with no configured remediation answers `Abort`.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Mutex;
use thiserror::Error;

use crate::types::{Event, Phase, PreflightQuestion, Remediation, Violation};

/// Errors raised when a port cannot satisfy a blocking request.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("no answer supplied for pre-flight question {index}")]
    MissingAnswer { index: usize },

    #[error("answers must not be empty (question {index})")]
    EmptyAnswer { index: usize },

    #[error("failed to read from the terminal: {0}")]
    Io(#[from] std::io::Error),
}

/// Callback surface the engine uses to talk to a human.
pub trait InteractionPort: Send + Sync {
    /// Ask a batch of pre-flight questions. Blocking; answers are returned
    /// in question order and the batch is all-or-nothing.
    fn ask(&self, questions: &[PreflightQuestion]) -> Result<Vec<String>, InteractionError>;

    /// Progress notification. Must never block the engine.
    fn announce(&self, event: &Event);

    /// Structured violation notification; no return value.
    fn report_violations(&self, violations: &[Violation]);

    /// Collect the remediation decision after a governance failure.
    fn remediate(&self, violations: &[Violation]) -> Result<Remediation, InteractionError>;
}

/// Interactive terminal binding: questions and menus on stdout, answers on
/// stdin.
#[derive(Debug, Default)]
pub struct ConsolePort;

impl ConsolePort {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// True when stdin can actually answer questions.
    #[must_use]
    pub fn is_interactive() -> bool {
        std::io::stdin().is_terminal()
    }

    fn read_line(prompt: &str) -> Result<String, InteractionError> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

impl InteractionPort for ConsolePort {
    fn ask(&self, questions: &[PreflightQuestion]) -> Result<Vec<String>, InteractionError> {
        let mut answers = Vec::with_capacity(questions.len());
        let total = questions.len();

        for question in questions {
            println!("Question {}/{}: {}", question.index, total, question.text);
            if let Some(context) = &question.context {
                println!("  ({context})");
            }

            // Re-prompt until the answer is non-empty; the batch is
            // all-or-nothing.
            loop {
                let answer = Self::read_line("Your answer: ")?;
                if !answer.is_empty() {
                    answers.push(answer);
                    break;
                }
                println!("An answer is required.");
            }
            println!();
        }

        Ok(answers)
    }

    fn announce(&self, event: &Event) {
        match event {
            Event::RunStarted { run_id } => println!("Starting run {run_id}"),
            Event::RunResumed { run_id, phase } => {
                println!("Resuming run {run_id} at phase {phase}");
            }
            Event::PhaseStarted { phase } => println!("Running phase: {phase}"),
            Event::PhaseCompleted { phase } => println!("Phase complete: {phase}"),
            Event::PhaseSkipped { phase } => println!("Skipping completed phases: {phase}"),
            Event::GovernanceRetry { phase, attempt } => {
                println!("Governance failed for {phase}; retry attempt {attempt}");
            }
            Event::IgnoreUnavailable => {
                println!("'Ignore' requires the --force flag; choose another option.");
            }
            Event::RunCompleted { run_id } => println!("Run {run_id} completed"),
            Event::RunFailed { run_id, reason } => println!("Run {run_id} failed: {reason}"),
        }
    }

    fn report_violations(&self, violations: &[Violation]) {
        println!("Constitutional violations ({}):", violations.len());
        for v in violations {
            let location = match v.line {
                Some(line) => format!("{}:{line}", v.artifact),
                None => v.artifact.clone(),
            };
            println!("  [{}] {} at {}", v.severity, v.principle, location);
            println!("      {}", v.description);
            println!("      fix: {}", v.suggestion);
        }
    }

    fn remediate(&self, _violations: &[Violation]) -> Result<Remediation, InteractionError> {
        loop {
            let choice = Self::read_line(
                "[R]egenerate, [E]dit constitution, [A]bort, [I]gnore? ",
            )?;
            match choice.to_ascii_lowercase().as_str() {
                "r" | "regenerate" => return Ok(Remediation::Regenerate),
                "e" | "edit" => return Ok(Remediation::EditConstitution),
                "a" | "abort" | "" => return Ok(Remediation::Abort),
                "i" | "ignore" => return Ok(Remediation::Ignore),
                other => println!("Unrecognized choice '{other}'."),
            }
        }
    }
}

/// Non-interactive binding: answers and remediations come from queues
/// configured up front. Used by tests and by pre-answered runs. Every
/// interaction is recorded for later assertions.
#[derive(Debug, Default)]
pub struct ScriptedPort {
    answers: Mutex<Vec<String>>,
    remediations: Mutex<Vec<Remediation>>,
    events: Mutex<Vec<Event>>,
    reported: Mutex<Vec<Vec<Violation>>>,
}

impl ScriptedPort {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for upcoming `ask` calls, consumed in order.
    #[must_use]
    pub fn with_answers<I, S>(self, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.answers
            .lock()
            .expect("answers lock")
            .extend(answers.into_iter().map(Into::into));
        self
    }

    /// Queue remediation choices, consumed in order. When the queue runs
    /// dry, `remediate` answers `Abort`.
    #[must_use]
    pub fn with_remediations<I>(self, remediations: I) -> Self
    where
        I: IntoIterator<Item = Remediation>,
    {
        self.remediations
            .lock()
            .expect("remediations lock")
            .extend(remediations);
        self
    }

    /// Events announced so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events lock").clone()
    }

    /// Violation batches reported so far.
    #[must_use]
    pub fn reported_violations(&self) -> Vec<Vec<Violation>> {
        self.reported.lock().expect("reported lock").clone()
    }

    /// Phases announced as skipped, in order.
    #[must_use]
    pub fn skipped_phases(&self) -> Vec<Phase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::PhaseSkipped { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }
}

impl InteractionPort for ScriptedPort {
    fn ask(&self, questions: &[PreflightQuestion]) -> Result<Vec<String>, InteractionError> {
        let mut queue = self.answers.lock().expect("answers lock");
        if queue.len() < questions.len() {
            return Err(InteractionError::MissingAnswer {
                index: queue.len() + 1,
            });
        }

        let answers: Vec<String> = queue.drain(..questions.len()).collect();
        for (i, answer) in answers.iter().enumerate() {
            if answer.trim().is_empty() {
                return Err(InteractionError::EmptyAnswer { index: i + 1 });
            }
        }
        Ok(answers)
    }

    fn announce(&self, event: &Event) {
        self.events.lock().expect("events lock").push(event.clone());
    }

    fn report_violations(&self, violations: &[Violation]) {
        self.reported
            .lock()
            .expect("reported lock")
            .push(violations.to_vec());
    }

    fn remediate(&self, _violations: &[Violation]) -> Result<Remediation, InteractionError> {
        let mut queue = self.remediations.lock().expect("remediations lock");
        if queue.is_empty() {
            // Unconfigured non-interactive remediation must abort.
            return Ok(Remediation::Abort);
        }
        Ok(queue.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(n: usize) -> Vec<PreflightQuestion> {
        (1..=n)
            .map(|index| PreflightQuestion {
                index,
                text: format!("Question {index}?"),
                context: None,
            })
            .collect()
    }

    #[test]
    fn scripted_ask_consumes_answers_in_order() {
        let port = ScriptedPort::new().with_answers(["alpha", "beta"]);
        let answers = port.ask(&questions(2)).unwrap();
        assert_eq!(answers, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn scripted_ask_is_all_or_nothing() {
        let port = ScriptedPort::new().with_answers(["only one"]);
        let err = port.ask(&questions(2)).unwrap_err();
        assert!(matches!(err, InteractionError::MissingAnswer { index: 2 }));
    }

    #[test]
    fn scripted_ask_rejects_empty_answers() {
        let port = ScriptedPort::new().with_answers(["ok", "  "]);
        let err = port.ask(&questions(2)).unwrap_err();
        assert!(matches!(err, InteractionError::EmptyAnswer { index: 2 }));
    }

    #[test]
    fn scripted_remediate_defaults_to_abort() {
        let port = ScriptedPort::new();
        assert_eq!(port.remediate(&[]).unwrap(), Remediation::Abort);
    }

    #[test]
    fn scripted_remediations_are_consumed_in_order() {
        let port = ScriptedPort::new()
            .with_remediations([Remediation::Regenerate, Remediation::Ignore]);
        assert_eq!(port.remediate(&[]).unwrap(), Remediation::Regenerate);
        assert_eq!(port.remediate(&[]).unwrap(), Remediation::Ignore);
        assert_eq!(port.remediate(&[]).unwrap(), Remediation::Abort);
    }

    #[test]
    fn events_are_recorded_in_order() {
        let port = ScriptedPort::new();
        port.announce(&Event::PhaseStarted { phase: Phase::Specify });
        port.announce(&Event::PhaseCompleted { phase: Phase::Specify });
        assert_eq!(port.events().len(), 2);
    }
}
