use rmcp::model::{CallToolResult, Content, ErrorData};

use crate::error::{DbaError, ErrorKind};

/// Serializes `value` as pretty JSON and wraps it in a successful tool
/// result. Every tool returns its payload this way so a client sees a
/// uniform `{content: [{type: "text", text: <json>}], isError: false}`
/// envelope regardless of which tool answered.
pub fn ok<T: serde::Serialize>(value: &T) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ErrorData::internal_error(format!("failed to serialize response: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Converts a [`DbaError`] into the MCP error shape, classifying it by
/// [`DbaError::kind`] so caller mistakes surface as `invalid_params`
/// rather than being indistinguishable from a server-side failure.
pub fn to_mcp_error(err: DbaError) -> ErrorData {
    let err = err.log();
    let message = err.to_string();
    match err.kind() {
        ErrorKind::Caller => ErrorData::invalid_params(message, None),
        ErrorKind::Environment | ErrorKind::Internal => ErrorData::internal_error(message, None),
    }
}
