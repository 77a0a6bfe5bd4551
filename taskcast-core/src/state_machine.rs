use crate::types::TaskStatus;

pub const TERMINAL_STATUSES: &[TaskStatus] = &[
    TaskStatus::Completed,
    TaskStatus::Failed,
    TaskStatus::Timeout,
    TaskStatus::Cancelled,
];

pub fn allowed_transitions(from: &TaskStatus) -> &'static [TaskStatus] {
    match from {
        TaskStatus::Pending => &[TaskStatus::Running, TaskStatus::Cancelled],
        TaskStatus::Running => &[
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Timeout,
            TaskStatus::Cancelled,
        ],
        TaskStatus::Completed
        | TaskStatus::Failed
        | TaskStatus::Timeout
        | TaskStatus::Cancelled => &[],
    }
}

pub fn can_transition(from: &TaskStatus, to: &TaskStatus) -> bool {
    if from == to {
        return false;
    }
    allowed_transitions(from).contains(to)
}

pub fn apply_transition(from: &TaskStatus, to: TaskStatus) -> Result<TaskStatus, String> {
    if !can_transition(from, &to) {
        return Err(format!("Invalid transition: {:?} \u{2192} {:?}", from, to));
    }
    Ok(to)
}

pub fn is_terminal(status: &TaskStatus) -> bool {
    TERMINAL_STATUSES.contains(status)
}
