/*!
Command layer.

  registry.rs  CommandTable / CommandEntry (name -> handler, ordered)
  dispatch.rs  argv -> listing | handler | UnknownCommand
  builtin.rs   the shipped commands (test, list, ping, ..., probe)
  format.rs    human / JSON rendering (listing, probe result)

main.rs builds a `Context`, asks `builtin_table` for the table and hands
it to `dispatch`. Handlers never print errors themselves; failures travel
back as `CommandError` and the error policy decides the exit status.
*/

pub mod builtin;
pub mod dispatch;
pub mod format;
pub mod registry;

pub use builtin::{Context, builtin_table};
pub use dispatch::dispatch;
pub use format::{OutputFormat, StyleOptions};
