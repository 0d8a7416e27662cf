use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

/// Instruction sent with every frame. The reply schema here is what
/// `ClassificationResult::from_json_object` reads back.
pub const POSTURE_PROMPT: &str = r#"请分析这个人的坐姿，返回JSON格式：
{
  "present": true/false,
  "head": "forward/straight/back",
  "back": "curved/straight",
  "eyes": "screen/book/away",
  "posture": "good/needs_improvement/unhealthy",
  "attention": "focused/distracted/unknown",
  "issues": ["问题列表"],
  "suggestions": ["建议列表"]
}"#;

pub fn jpeg_data_uri(image: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(image))
}

pub fn build_request_body(model: &str, image: &[u8]) -> Value {
    json!({
        "model": model,
        "input": {
            "messages": [{
                "role": "user",
                "content": [
                    { "image": jpeg_data_uri(image) },
                    { "text": POSTURE_PROMPT }
                ]
            }]
        }
    })
}
