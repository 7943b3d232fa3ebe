//! Hand a message straight back to the operator

use async_trait::async_trait;

use super::{framed, ParamSpec, ToolArgs, ToolError, ToolSchema, ToolTrait};
use crate::cache::MeasurementCache;

/// Ends the session with `content` as the answer
pub struct FeedbackUserTool {
    schema: ToolSchema,
}

impl FeedbackUserTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![
                ParamSpec::required_text("content"),
                ParamSpec::required_text("role"),
            ]),
        }
    }
}

impl Default for FeedbackUserTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolTrait for FeedbackUserTool {
    fn name(&self) -> &str {
        "feedback_user"
    }
    fn description(&self) -> &str {
        "When anything goes wrong, do not apologise: call this tool to report the problem \
         to the user. Only for reporting errors."
    }
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
    fn return_direct(&self) -> bool {
        true
    }
    async fn execute(
        &self,
        args: ToolArgs,
        _cache: &mut MeasurementCache,
    ) -> Result<String, ToolError> {
        Ok(framed(args.text("content")?))
    }
}
