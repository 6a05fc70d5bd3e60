//! Progress rendering
//!
//! The only place that writes progress to the terminal. It consumes the
//! engine's event channel on a single task, so concurrent workers never
//! touch the terminal themselves.

use std::io::{IsTerminal, Write};

use photovault_backup::progress::ProgressEvent;
use tokio::{sync::mpsc, task::JoinHandle};

/// Spawns the consumer; it finishes once every sender is dropped
pub fn spawn_renderer(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interactive = std::io::stderr().is_terminal();
        let mut bar_visible = false;

        while let Some(event) = rx.recv().await {
            let mut stderr = std::io::stderr().lock();
            match render(&event) {
                Rendered::Bar(line) if interactive => {
                    let _ = write!(stderr, "\r\x1b[2K{line}");
                    bar_visible = true;
                }
                Rendered::Bar(_) | Rendered::Nothing => {}
                Rendered::Line(line) => {
                    if bar_visible {
                        let _ = write!(stderr, "\r\x1b[2K");
                        bar_visible = false;
                    }
                    let _ = writeln!(stderr, "{line}");
                }
            }
            let _ = stderr.flush();
        }

        if bar_visible {
            let _ = writeln!(std::io::stderr());
        }
    })
}

/// How one event shows up on the terminal
#[derive(Debug, PartialEq)]
enum Rendered {
    /// Replaces the in-place progress bar
    Bar(String),
    /// A permanent line
    Line(String),
    Nothing,
}

const BAR_WIDTH: usize = 30;

fn bar(completed: u64, total: u64) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        ((completed.min(total) as f64 / total as f64) * BAR_WIDTH as f64) as usize
    };
    format!(
        "[{}{}] {completed}/{total} files",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

fn render(event: &ProgressEvent) -> Rendered {
    match event {
        ProgressEvent::RunStarted { groups, files } => {
            Rendered::Line(format!("Backing up {files} files in {groups} groups"))
        }
        ProgressEvent::GroupSkipped { group } => {
            Rendered::Line(format!("  {group}: already uploaded, skipped"))
        }
        ProgressEvent::FileArchived {
            completed, total, ..
        } => Rendered::Bar(bar(*completed, *total)),
        ProgressEvent::UploadAttempt {
            group,
            attempt,
            max_attempts,
        } if *attempt > 1 => Rendered::Line(format!(
            "  {group}: retrying upload ({attempt}/{max_attempts})"
        )),
        ProgressEvent::VerificationMismatch { group, reason } => {
            Rendered::Line(format!("  {group}: checksum verification failed: {reason}"))
        }
        ProgressEvent::GroupCompleted { group, remote_key } => {
            Rendered::Line(format!("  \u{2713} {group} -> {remote_key}"))
        }
        ProgressEvent::GroupFailed {
            group,
            kind,
            reason,
        } => Rendered::Line(format!("  \u{2717} {group}: {kind}: {reason}")),
        ProgressEvent::ArchiveStarted { .. }
        | ProgressEvent::ArchiveBuilt { .. }
        | ProgressEvent::UploadAttempt { .. }
        | ProgressEvent::UploadCompleted { .. }
        | ProgressEvent::RunFinished { .. } => Rendered::Nothing,
    }
}

#[cfg(test)]
mod tests {
    use photovault_core::domain::{FailureKind, GroupKey};

    use super::*;

    fn key() -> GroupKey {
        "2024-03".parse().unwrap()
    }

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(
            bar(0, 4),
            format!("[{}] 0/4 files", "-".repeat(BAR_WIDTH))
        );
        assert_eq!(
            bar(2, 4),
            format!("[{}{}] 2/4 files", "#".repeat(15), "-".repeat(15))
        );
        assert_eq!(
            bar(9, 4),
            format!("[{}] 9/4 files", "#".repeat(BAR_WIDTH))
        );
    }

    #[test]
    fn first_attempt_is_silent_retries_are_shown() {
        let first = ProgressEvent::UploadAttempt {
            group: key(),
            attempt: 1,
            max_attempts: 3,
        };
        assert_eq!(render(&first), Rendered::Nothing);

        let second = ProgressEvent::UploadAttempt {
            group: key(),
            attempt: 2,
            max_attempts: 3,
        };
        assert_eq!(
            render(&second),
            Rendered::Line("  2024-03: retrying upload (2/3)".to_string())
        );
    }

    #[test]
    fn failures_name_the_kind() {
        let event = ProgressEvent::GroupFailed {
            group: key(),
            kind: FailureKind::UploadFailed,
            reason: "timeout".to_string(),
        };
        assert_eq!(
            render(&event),
            Rendered::Line("  \u{2717} 2024-03: upload_failed: timeout".to_string())
        );
    }

    #[tokio::test]
    async fn renderer_exits_when_senders_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_renderer(rx);
        tx.send(ProgressEvent::RunStarted { groups: 1, files: 1 })
            .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
