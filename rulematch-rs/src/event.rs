//! Access to the parts of a raw event payload that ownership matchers read.

use serde_json::{Map, Value};

/// A raw stack frame mapping.
pub type FrameData = Map<String, Value>;

/// Keys checked by `path` and `codeowners` matchers on every platform.
pub const DEFAULT_PATH_KEYS: &[&str] = &["filename", "abs_path"];

/// Key under which [`DefaultMunger`] stores rewritten filenames.
pub const MUNGED_FILENAME_KEY: &str = "munged_filename";

const TAG_ALIASES: &[(&str, &str)] = &[
    ("release", "sentry:release"),
    ("dist", "sentry:dist"),
    ("user", "sentry:user"),
];

/// The internal tag name a short tag name is stored under, or the name
/// itself.
pub fn tag_alias(name: &str) -> &str {
    TAG_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |&(_, tag)| tag)
}

/// Collect the stack frames of an event. Frames of exception stack traces win
/// over a top-level stack trace. Entries that are not objects are skipped.
pub fn find_stack_frames(event: &Value) -> Vec<FrameData> {
    let frames_of = |stacktrace: Option<&Value>| {
        stacktrace
            .and_then(|st| st.get("frames"))
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .cloned()
            .collect::<Vec<_>>()
    };

    match event.pointer("/exception/values").and_then(Value::as_array) {
        Some(values) if !values.is_empty() => values
            .iter()
            .flat_map(|exception| frames_of(exception.get("stacktrace")))
            .collect(),
        _ => frames_of(event.get("stacktrace")),
    }
}

/// Produces the frames and frame keys that filename-based matchers inspect.
///
/// Some SDKs report filenames that do not resemble repository paths, so
/// implementations may rewrite frames and name an extra key to look at.
pub trait FrameMunger {
    fn munge(&self, event: &Value) -> (Vec<FrameData>, Vec<String>);
}

/// Probes `filename` and `abs_path`. Java frames additionally get a
/// `munged_filename` built from the module path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMunger;

impl FrameMunger for DefaultMunger {
    fn munge(&self, event: &Value) -> (Vec<FrameData>, Vec<String>) {
        let mut frames = find_stack_frames(event);
        let mut keys = DEFAULT_PATH_KEYS
            .iter()
            .map(|&k| k.to_owned())
            .collect::<Vec<_>>();

        if event.get("platform").and_then(Value::as_str) == Some("java") {
            let mut munged_any = false;
            for frame in &mut frames {
                if let Some(munged) = java_munged_filename(frame) {
                    frame.insert(MUNGED_FILENAME_KEY.to_owned(), Value::String(munged));
                    munged_any = true;
                }
            }
            if munged_any {
                keys.push(MUNGED_FILENAME_KEY.to_owned());
            }
        }

        (frames, keys)
    }
}

// `com.example.Foo$Inner` + `Foo.java` -> `com/example/Foo.java`
fn java_munged_filename(frame: &FrameData) -> Option<String> {
    let filename = frame.get("filename")?.as_str()?;
    let module = frame.get("module")?.as_str()?;
    if filename.is_empty() || module.is_empty() || filename.contains('/') {
        return None;
    }
    let mut parts = module.split('.').collect::<Vec<_>>();
    parts.pop();
    parts.push(filename);
    Some(parts.join("/"))
}
