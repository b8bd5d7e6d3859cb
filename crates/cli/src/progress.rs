use indicatif::{ProgressBar, ProgressStyle};
use terravigil_client::session::{SessionHandle, SessionView};
use terravigil_client::WorkflowError;

fn build_task_progress_bar(file_name: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(format!("uploading {file_name}"));
    pb
}

/// Renders session views on a progress bar until no request is outstanding.
pub async fn follow_session(
    session: &SessionHandle,
    file_name: &str,
) -> Result<SessionView, WorkflowError> {
    let pb = build_task_progress_bar(file_name);
    let mut views = session.subscribe();

    loop {
        let view = views.borrow_and_update().clone();
        if let Some(task) = view.workflow.task() {
            pb.set_position(u64::from(task.progress()));
            if view.poll_errors > 0 {
                pb.set_message(format!(
                    "task {} status request failed ({} in a row)",
                    task.id(),
                    view.poll_errors
                ));
            } else {
                pb.set_message(format!("task {} {}", task.id(), task.status()));
            }
        }

        if view.is_settled() {
            match view.workflow.error() {
                None => pb.finish_with_message(format!("{file_name} analysed")),
                Some(err) => pb.abandon_with_message(err.to_string()),
            }
            return Ok(view);
        }

        views
            .changed()
            .await
            .map_err(|_| WorkflowError::SessionClosed)?;
    }
}
