/*!
`dispatch.rs`

Resolve `argv` (program name already stripped) against a `CommandTable`.

  []                -> write the listing, run nothing
  [name, rest @ ..] -> run `name` with `rest`, or `UnknownCommand` if absent
*/

use std::io::Write;

use crate::cmd::format::{OutputFormat, StyleOptions, render_listing};
use crate::cmd::registry::CommandTable;
use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Listed,
    Ran { name: String },
}

pub fn dispatch(
    table: &CommandTable,
    argv: &[String],
    format: OutputFormat,
    style: &StyleOptions,
    out: &mut dyn Write,
) -> Result<Outcome, DispatchError> {
    let Some((cmd, rest)) = argv.split_first() else {
        writeln!(out, "{}", render_listing(table, format, style))?;
        return Ok(Outcome::Listed);
    };

    let entry = table
        .get(cmd)
        .ok_or_else(|| DispatchError::UnknownCommand(cmd.clone()))?;

    tracing::debug!(command = %cmd, args = ?rest, "dispatching");
    entry.invoke(rest)?;
    Ok(Outcome::Ran {
        name: entry.name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use std::cell::RefCell;
    use std::rc::Rc;

    const NAMES: [&str; 6] = ["test", "list", "ping", "shutdown", "run", "dbg"];

    /// Table whose handlers record `(name, args)` into a shared log.
    fn recording_table() -> (CommandTable, Rc<RefCell<Vec<(String, Vec<String>)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut t = CommandTable::new();
        for name in NAMES {
            let log = log.clone();
            t.register(name, "", move |args| {
                log.borrow_mut().push((name.to_string(), args.to_vec()));
                Ok(())
            })
            .unwrap();
        }
        (t, log)
    }

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn run(t: &CommandTable, words: &[&str]) -> (Result<Outcome, DispatchError>, String) {
        let mut out = Vec::new();
        let res = dispatch(
            t,
            &argv(words),
            OutputFormat::Human,
            &StyleOptions::plain(),
            &mut out,
        );
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn each_name_invokes_exactly_one_handler() {
        for name in NAMES {
            let (t, log) = recording_table();
            let (res, out) = run(&t, &[name]);
            assert_eq!(
                res.unwrap(),
                Outcome::Ran {
                    name: name.to_string()
                }
            );
            assert!(out.is_empty());
            assert_eq!(*log.borrow(), [(name.to_string(), Vec::<String>::new())]);
        }
    }

    #[test]
    fn empty_argv_lists_and_runs_nothing() {
        let (t, log) = recording_table();
        let (res, out) = run(&t, &[]);
        assert_eq!(res.unwrap(), Outcome::Listed);
        assert!(log.borrow().is_empty());
        let listed: Vec<_> = out.lines().skip(1).map(str::trim).collect();
        assert_eq!(listed, NAMES);
    }

    #[test]
    fn unknown_name_runs_nothing_and_prints_nothing() {
        let (t, log) = recording_table();
        let (res, out) = run(&t, &["deploy", "--now"]);
        assert!(matches!(res, Err(DispatchError::UnknownCommand(ref n)) if n == "deploy"));
        assert!(out.is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn rest_is_forwarded_verbatim() {
        let (t, log) = recording_table();
        run(&t, &["run", "--release", "-v", "x y"]).0.unwrap();
        assert_eq!(log.borrow()[0].1, argv(&["--release", "-v", "x y"]));
    }

    #[test]
    fn replaced_handler_is_the_only_one_called() {
        let (mut t, log) = recording_table();
        let hit = Rc::new(RefCell::new(0));
        let h = hit.clone();
        t.register("ping", "", move |_| {
            *h.borrow_mut() += 1;
            Ok(())
        })
        .unwrap();
        run(&t, &["ping"]).0.unwrap();
        assert_eq!(*hit.borrow(), 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn handler_error_propagates() {
        let mut t = CommandTable::new();
        t.register("shutdown", "", |_| {
            Err(CommandError::NonZeroExit {
                command: "grpc_cli call localhost:50051 Shutdown ''".into(),
                code: Some(1),
            })
        })
        .unwrap();
        let (res, _) = run(&t, &["shutdown"]);
        assert!(matches!(
            res,
            Err(DispatchError::Command(CommandError::NonZeroExit { .. }))
        ));
    }
}
