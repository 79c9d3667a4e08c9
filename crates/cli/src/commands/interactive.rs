use console::style;
use inquire::{InquireError, Select};
use migshift_engine::{MigrationState, MigrationStatus};
use std::fmt;

use super::{format_status, migrate, print_orphans, Context};
use crate::error::CliError;

/// Select entry for one migration
struct Entry(MigrationStatus);

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_status(&self.0).trim_start())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    BringToTop,
    Apply,
    Revert,
    Redo,
    Back,
}

impl Action {
    fn available(state: MigrationState) -> Vec<Action> {
        match state {
            MigrationState::Applied => vec![Action::BringToTop, Action::Redo, Action::Revert, Action::Back],
            MigrationState::Pending => vec![Action::BringToTop, Action::Apply, Action::Back],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::BringToTop => "Bring to top",
            Action::Apply => "Apply",
            Action::Revert => "Revert",
            Action::Redo => "Revert and re-apply",
            Action::Back => "Back",
        };
        f.write_str(label)
    }
}

/// Escape or Ctrl-C ends the session quietly
fn cancelled(err: &InquireError) -> bool {
    matches!(
        err,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

/// Pick a migration, then an action, until the operator leaves
pub async fn run(ctx: &Context) -> Result<(), CliError> {
    println!();
    println!("{}", style("migshift interactive").cyan().bold());
    println!("{}", style("Pick a migration, Esc to quit").dim());
    println!();

    loop {
        let (statuses, orphaned_versions) = migrate::collect_status(ctx).await?;
        if !orphaned_versions.is_empty() {
            print_orphans(&orphaned_versions);
            println!();
        }
        if statuses.is_empty() {
            println!(
                "No migrations found in {}",
                ctx.migrator.scripts().root().display()
            );
            return Ok(());
        }

        let entries: Vec<Entry> = statuses.into_iter().map(Entry).collect();
        let starting = entries
            .iter()
            .position(|e| e.0.is_most_recently_applied)
            .unwrap_or(0);

        let picked = match Select::new("Migration:", entries)
            .with_starting_cursor(starting)
            .with_page_size(15)
            .prompt()
        {
            Ok(entry) => entry.0,
            Err(e) if cancelled(&e) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let action = match Select::new(
            &format!("{} ({}):", picked.name, picked.version),
            Action::available(picked.state),
        )
        .prompt()
        {
            Ok(action) => action,
            Err(e) if cancelled(&e) => continue,
            Err(e) => return Err(e.into()),
        };

        let result = match action {
            Action::BringToTop => migrate::bring_status_to_top(ctx, &picked, None).await,
            Action::Apply => migrate::up(ctx, picked.version).await,
            Action::Revert => migrate::down(ctx, picked.version).await,
            Action::Redo => migrate::redo(ctx, picked.version).await,
            Action::Back => continue,
        };

        // A half-finished reorder must reach the operator; other failures
        // leave the session running
        match result {
            Err(CliError::Migrate(e)) if e.needs_reconciliation() => return Err(e.into()),
            Err(e) => println!("{} {}", style("✗").red(), e),
            Ok(()) => {}
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_migrations_cannot_be_reverted() {
        let actions = Action::available(MigrationState::Pending);
        assert!(!actions.contains(&Action::Revert));
        assert!(!actions.contains(&Action::Redo));
        assert!(actions.contains(&Action::BringToTop));
    }

    #[test]
    fn test_applied_migrations_offer_redo() {
        let actions = Action::available(MigrationState::Applied);
        assert!(actions.contains(&Action::Redo));
        assert!(!actions.contains(&Action::Apply));
    }
}
