use serde_json::Value;

use crate::event::find_stack_frames;

/// Read-only snapshot of one stack frame, as seen by enhancer matchers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchFrame {
    pub module: Option<String>,
    pub path: Option<String>,
    pub package: Option<String>,
    pub function: Option<String>,
    pub family: Option<String>,
    pub in_app: Option<bool>,
    pub category: Option<String>,
}

const NATIVE_PLATFORMS: &[&str] = &["objc", "cocoa", "swift", "native", "c"];
const JAVASCRIPT_PLATFORMS: &[&str] = &["javascript", "node"];

/// Map a platform name to the family used by `family:` matchers.
pub fn family_for_platform(platform: Option<&str>) -> &'static str {
    match platform {
        Some(p) if NATIVE_PLATFORMS.contains(&p) => "native",
        Some(p) if JAVASCRIPT_PLATFORMS.contains(&p) => "javascript",
        _ => "other",
    }
}

impl MatchFrame {
    /// Build a snapshot from a raw event frame. The frame's own platform takes
    /// precedence over the event platform. Paths and packages are lowercased.
    pub fn from_frame_data(frame: &Value, platform: Option<&str>) -> MatchFrame {
        let string = |key: &str| frame.get(key).and_then(Value::as_str).map(str::to_owned);
        let frame_platform = frame.get("platform").and_then(Value::as_str);

        MatchFrame {
            module: string("module"),
            path: string("abs_path")
                .filter(|p| !p.is_empty())
                .or_else(|| string("filename"))
                .map(|p| p.to_lowercase()),
            package: string("package").map(|p| p.to_lowercase()),
            function: string("function"),
            family: Some(family_for_platform(frame_platform.or(platform)).to_owned()),
            in_app: Some(frame.get("in_app").and_then(Value::as_bool).unwrap_or(false)),
            category: frame
                .pointer("/data/category")
                .and_then(Value::as_str)
                .map(str::to_owned),
        }
    }

    /// Snapshots of every stack frame of an event, in event order.
    pub fn from_event(event: &Value) -> Vec<MatchFrame> {
        let platform = event.get("platform").and_then(Value::as_str);
        find_stack_frames(event)
            .into_iter()
            .map(|frame| MatchFrame::from_frame_data(&Value::Object(frame), platform))
            .collect()
    }
}

/// The exception fields that `type:`, `value:` and `mechanism:` inspect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionData {
    pub ty: Option<String>,
    pub value: Option<String>,
    pub mechanism_type: Option<String>,
}

impl ExceptionData {
    pub fn from_exception(exception: &Value) -> ExceptionData {
        let string = |pointer: &str| {
            exception
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        ExceptionData {
            ty: string("/type"),
            value: string("/value"),
            mechanism_type: string("/mechanism/type"),
        }
    }

    /// Data of the last exception of an event, the one the issue reports.
    pub fn from_event(event: &Value) -> ExceptionData {
        event
            .pointer("/exception/values")
            .and_then(Value::as_array)
            .and_then(|values| values.last())
            .map(ExceptionData::from_exception)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_frame_data() {
        let frame = json!({
            "abs_path": "/Users/Dev/App.js",
            "filename": "app.js",
            "module": "app",
            "function": "render",
            "package": "/Apps/Foo.app",
            "data": {"category": "ui"},
        });
        let match_frame = MatchFrame::from_frame_data(&frame, Some("javascript"));

        assert_eq!(
            match_frame,
            MatchFrame {
                module: Some("app".into()),
                path: Some("/users/dev/app.js".into()),
                package: Some("/apps/foo.app".into()),
                function: Some("render".into()),
                family: Some("javascript".into()),
                in_app: Some(false),
                category: Some("ui".into()),
            }
        );
    }

    #[test]
    fn test_frame_platform_overrides_event_platform() {
        let frame = json!({"filename": "Foo.c", "platform": "native", "in_app": true});
        let match_frame = MatchFrame::from_frame_data(&frame, Some("javascript"));

        assert_eq!(match_frame.family.as_deref(), Some("native"));
        assert_eq!(match_frame.path.as_deref(), Some("foo.c"));
        assert_eq!(match_frame.in_app, Some(true));
    }

    #[test]
    fn test_family_for_platform() {
        assert_eq!(family_for_platform(Some("cocoa")), "native");
        assert_eq!(family_for_platform(Some("node")), "javascript");
        assert_eq!(family_for_platform(Some("python")), "other");
        assert_eq!(family_for_platform(None), "other");
    }

    #[test]
    fn test_from_event() {
        let event = json!({
            "platform": "cocoa",
            "exception": {"values": [
                {"type": "Inner", "stacktrace": {"frames": [{"function": "a"}]}},
                {
                    "type": "Outer",
                    "value": "boom",
                    "stacktrace": {"frames": [{"function": "b", "platform": "javascript"}]},
                },
            ]},
        });
        let frames = MatchFrame::from_event(&event);
        let summary = frames
            .iter()
            .map(|f| (f.function.as_deref(), f.family.as_deref()))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![(Some("a"), Some("native")), (Some("b"), Some("javascript"))]
        );

        let exception = ExceptionData::from_event(&event);
        assert_eq!(exception.ty.as_deref(), Some("Outer"));
        assert_eq!(exception.value.as_deref(), Some("boom"));
        assert_eq!(ExceptionData::from_event(&json!({})), ExceptionData::default());
    }

    #[test]
    fn test_exception_data() {
        let exception = json!({
            "type": "ValueError",
            "value": "bad value",
            "mechanism": {"type": "generic"},
        });
        assert_eq!(
            ExceptionData::from_exception(&exception),
            ExceptionData {
                ty: Some("ValueError".into()),
                value: Some("bad value".into()),
                mechanism_type: Some("generic".into()),
            }
        );
        assert_eq!(
            ExceptionData::from_exception(&json!({})),
            ExceptionData::default()
        );
    }
}
