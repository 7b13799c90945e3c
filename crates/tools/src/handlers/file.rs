use async_trait::async_trait;
use serde_json::{json, Value};

use crate::executor::{Handled, ToolContext, ToolEnv, ToolFailure, ToolHandler};
use crate::files::{mime_for, object_path, sanitize_filename, GeneratedFile};
use crate::input::{CreateFileInput, ToolInput};

pub struct CreateFile;

#[async_trait]
impl ToolHandler for CreateFile {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let req = CreateFileInput::from_value(input)?;
        let size = req.content.len();
        if size > env.settings.max_file_bytes {
            return Err(ToolFailure(format!(
                "File too large: {size} bytes (limit {})",
                env.settings.max_file_bytes
            )));
        }
        let mime = mime_for(&req.format).ok_or("Unsupported format")?;
        let filename = sanitize_filename(&req.filename, &req.format);
        let path = object_path(&ctx.owner_id, &filename, ctx.now);

        env.files
            .upload(&path, req.content.into_bytes(), mime)
            .await?;
        let url = env
            .files
            .signed_url(&path, env.settings.signed_url_ttl)
            .await?;

        let file = GeneratedFile {
            filename: filename.clone(),
            url,
            format: req.format,
            size,
        };
        let mut handled = Handled::new(
            json!({
                "file": file,
                "expires_in_secs": env.settings.signed_url_ttl.as_secs(),
            }),
            format!("Created file {filename}"),
        );
        handled.file = Some(file);
        Ok(handled)
    }
}
