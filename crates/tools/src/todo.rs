use hb_domain::crm::{Todo, TodoStatus};

use crate::input::TodoSpec;

/// The task list of one streamed turn. Never persisted; the client learns
/// about it through `todo_update` events.
///
/// At most one item is expected to be in progress at a time. That is the
/// model's job to respect, so a second `in_progress` is only logged.
#[derive(Debug, Clone, Default)]
pub struct TodoList {
    items: Vec<Todo>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list. Every item starts out pending.
    pub fn replace(&mut self, specs: Vec<TodoSpec>) -> Vec<Todo> {
        self.items = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Todo {
                index,
                content: spec.content,
                active_form: spec.active_form,
                status: TodoStatus::Pending,
            })
            .collect();
        self.items.clone()
    }

    pub fn update(&mut self, index: usize, status: TodoStatus) -> Result<Todo, String> {
        if status == TodoStatus::InProgress
            && self
                .items
                .iter()
                .any(|t| t.index != index && t.status == TodoStatus::InProgress)
        {
            tracing::debug!(index, "second todo marked in_progress");
        }
        let len = self.items.len();
        let item = self
            .items
            .get_mut(index)
            .ok_or_else(|| format!("No todo at index {index} (list has {len} items)"))?;
        item.status = status;
        Ok(item.clone())
    }

    pub fn snapshot(&self) -> Vec<Todo> {
        self.items.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> TodoSpec {
        TodoSpec {
            content: s.into(),
            active_form: format!("{s}ing"),
        }
    }

    #[test]
    fn replace_indexes_from_zero_and_resets_status() {
        let mut list = TodoList::new();
        list.replace(vec![spec("Create"), spec("Draft")]);
        list.update(0, TodoStatus::Completed).unwrap();

        let fresh = list.replace(vec![spec("Email")]);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].index, 0);
        assert_eq!(fresh[0].status, TodoStatus::Pending);
    }

    #[test]
    fn update_out_of_range_is_an_error() {
        let mut list = TodoList::new();
        list.replace(vec![spec("Create")]);
        assert!(list.update(3, TodoStatus::Completed).is_err());
        assert_eq!(list.update(0, TodoStatus::InProgress).unwrap().status, TodoStatus::InProgress);
    }
}
