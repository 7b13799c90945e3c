use async_trait::async_trait;
use serde_json::{json, Value};

use crate::executor::{Handled, ToolContext, ToolEnv, ToolFailure, ToolHandler};
use crate::input::{CreateTodosInput, ToolInput, UpdateTodoInput};

pub struct CreateTodos;

#[async_trait]
impl ToolHandler for CreateTodos {
    async fn handle(
        &self,
        _env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let req = CreateTodosInput::from_value(input)?;
        let todos = ctx.todos.lock().replace(req.todos);
        let n = todos.len();
        Ok(Handled::new(
            json!({ "todos": todos }),
            format!("Planned {n} steps"),
        ))
    }
}

pub struct UpdateTodo;

#[async_trait]
impl ToolHandler for UpdateTodo {
    async fn handle(
        &self,
        _env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let req = UpdateTodoInput::from_value(input)?;
        let todo = ctx
            .todos
            .lock()
            .update(req.index, req.status)
            .map_err(ToolFailure)?;
        Ok(Handled::new(
            json!({ "todo": todo }),
            format!("Step {} is now {}", todo.index + 1, todo.status.as_str()),
        ))
    }
}
