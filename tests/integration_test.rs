//! End-to-end tests of the info and plot entry points against mock backends.

use ndarray::{ArrayD, IxDyn};
use sci_data_viewer::backends::BackendSet;
use sci_data_viewer::capability::StaticProbe;
use sci_data_viewer::data_source::{
    ArrayEntry, ArrayReader, Backend, GroupTable, OpenOptions, TreeHandle,
};
use sci_data_viewer::envelope::Envelope;
use sci_data_viewer::errors::{BackendError, BackendResult, ErrorKind};
use sci_data_viewer::registry::{BackendCandidate, FormatRegistry};
use sci_data_viewer::service::Inspector;
use sci_data_viewer::types::ElementType;
use serde_json::Value;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

/// Shared open/close bookkeeping for every table a mock hands out.
#[derive(Clone, Default)]
struct Counters {
    opened: Rc<Cell<usize>>,
    closed: Rc<Cell<usize>>,
    tree_closed: Rc<Cell<usize>>,
}

impl Counters {
    fn balanced(&self) -> bool {
        self.opened.get() == self.closed.get()
    }
}

struct CountingReader {
    counters: Counters,
    fail_reads: bool,
}

impl ArrayReader for CountingReader {
    fn read(&self, entry: &ArrayEntry) -> BackendResult<ArrayD<f64>> {
        if self.fail_reads {
            return Err(BackendError::decode(format!("checksum mismatch in '{}'", entry.name)));
        }
        let count = entry.element_count();
        Ok(ArrayD::from_shape_vec(IxDyn(&entry.shape), (0..count).map(|i| i as f64).collect())?)
    }

    fn close(&mut self) {
        self.counters.closed.set(self.counters.closed.get() + 1);
    }
}

fn sample_table(counters: &Counters, dims: &[(&str, usize)]) -> GroupTable {
    build_table(counters, dims, false)
}

fn build_table(counters: &Counters, dims: &[(&str, usize)], fail_reads: bool) -> GroupTable {
    counters.opened.set(counters.opened.get() + 1);
    let mut builder = GroupTable::builder();
    for (name, len) in dims {
        builder
            .variable(ArrayEntry::new(*name, ElementType::Float64, vec![(name.to_string(), *len)]))
            .unwrap();
    }
    builder
        .variable(
            ArrayEntry::new(
                "temp",
                ElementType::Float32,
                dims.iter().map(|(n, l)| (n.to_string(), *l)).collect(),
            )
            .with_attribute("units", "K"),
        )
        .unwrap();
    builder.build(Box::new(CountingReader {
        counters: counters.clone(),
        fail_reads,
    }))
}

/// Flat-only backend that knows about two subgroups.
struct GroupedBackend {
    counters: Counters,
}

impl Backend for GroupedBackend {
    fn id(&self) -> &str {
        "grouped"
    }

    fn open_flat(&self, _path: &Path, group: &str, _options: &OpenOptions) -> BackendResult<GroupTable> {
        match group {
            "/" | "/group1" | "/group2" => Ok(sample_table(&self.counters, &[("y", 3), ("x", 4)])),
            other => Err(BackendError::NotFound(format!("group '{}'", other))),
        }
    }

    fn list_groups(&self, _path: &Path, _options: &OpenOptions) -> Option<BackendResult<Vec<String>>> {
        Some(Ok(vec!["group1".to_string(), "/group2/".to_string(), "/".to_string()]))
    }
}

/// Backend without tree support: exercises the degraded flat open.
struct FlatOnlyBackend {
    counters: Counters,
}

impl Backend for FlatOnlyBackend {
    fn id(&self) -> &str {
        "flat"
    }

    fn open_flat(&self, _path: &Path, _group: &str, _options: &OpenOptions) -> BackendResult<GroupTable> {
        Ok(sample_table(&self.counters, &[("time", 1), ("lat", 5), ("lon", 5)]))
    }
}

/// Opens fine, but every value read fails.
struct UnreadableBackend {
    counters: Counters,
}

impl Backend for UnreadableBackend {
    fn id(&self) -> &str {
        "unreadable"
    }

    fn open_flat(&self, _path: &Path, _group: &str, _options: &OpenOptions) -> BackendResult<GroupTable> {
        Ok(build_table(&self.counters, &[("y", 3), ("x", 4)], true))
    }
}

/// Backend that always fails with its own message.
struct FailingBackend {
    id: &'static str,
    message: &'static str,
}

impl Backend for FailingBackend {
    fn id(&self) -> &str {
        self.id
    }

    fn open_tree(&self, _path: &Path, _options: &OpenOptions) -> BackendResult<Box<dyn TreeHandle>> {
        Err(BackendError::decode(self.message))
    }

    fn open_flat(&self, _path: &Path, _group: &str, _options: &OpenOptions) -> BackendResult<GroupTable> {
        Err(BackendError::decode(self.message))
    }
}

struct MockTree {
    counters: Counters,
    failing_group: Option<&'static str>,
}

impl TreeHandle for MockTree {
    fn group_paths(&self) -> BackendResult<Vec<String>> {
        Ok(vec!["/".to_string(), "/a".to_string(), "/a/b".to_string()])
    }

    fn group_table(&self, path: &str) -> BackendResult<GroupTable> {
        if self.failing_group == Some(path) {
            return Err(BackendError::decode(format!("group '{}' is truncated", path)));
        }
        Ok(sample_table(&self.counters, &[("t", 3), ("z", 2), ("y", 4), ("x", 4)]))
    }

    fn close(&mut self) {
        self.counters.tree_closed.set(self.counters.tree_closed.get() + 1);
    }
}

struct TreeBackend {
    counters: Counters,
    failing_group: Option<&'static str>,
}

impl Backend for TreeBackend {
    fn id(&self) -> &str {
        "tree"
    }

    fn open_tree(&self, _path: &Path, _options: &OpenOptions) -> BackendResult<Box<dyn TreeHandle>> {
        Ok(Box::new(MockTree {
            counters: self.counters.clone(),
            failing_group: self.failing_group,
        }))
    }

    fn open_flat(&self, _path: &Path, _group: &str, _options: &OpenOptions) -> BackendResult<GroupTable> {
        Err(BackendError::decode("flat open should not be needed"))
    }
}

fn candidate(id: &str, forces_flat_open: bool) -> BackendCandidate {
    BackendCandidate {
        id: id.to_string(),
        required_dependency: id.to_string(),
        open_options: OpenOptions::new(),
        forces_flat_open,
    }
}

fn inspector(candidates: Vec<BackendCandidate>, available: &[&str], backends: BackendSet) -> Inspector {
    let mut registry = FormatRegistry::empty();
    registry.register(".mock", "Mock", candidates);
    Inspector::default()
        .with_registry(registry)
        .with_probe(Box::new(StaticProbe::new(available.iter().copied())))
        .with_backends(backends)
}

fn data_file() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.mock");
    std::fs::write(&path, b"0123456789").unwrap();
    (dir, path)
}

fn json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

fn keys(value: &Value) -> Vec<String> {
    value.as_object().unwrap().keys().cloned().collect()
}

#[test]
fn test_forced_flat_backend_opens_every_probed_group() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("grouped", true)],
        &["grouped"],
        BackendSet::new().with(Box::new(GroupedBackend {
            counters: counters.clone(),
        })),
    );

    let envelope = inspector.file_info(&path);
    assert!(envelope.is_ok());
    let value = json(&envelope);
    let result = &value["result"];
    assert_eq!(keys(&result["textReprFlattened"]), vec!["/", "/group1", "/group2"]);
    assert_eq!(keys(&result["variablesFlattened"]), vec!["/", "/group1", "/group2"]);
    assert_eq!(result["usedBackend"], "grouped");
    assert_eq!(result["fileSize"], 10);
    assert!(result["textRepr"].as_str().unwrap().starts_with("Group: /\n\n"));
    assert!(result["markupRepr"].as_str().unwrap().contains("<p>Group: /group2</p>"));
    assert_eq!(result["variablesFlattened"]["/group1"][0]["name"], "temp");
    assert_eq!(result["coordinatesFlattened"]["/"][0]["name"], "y");
    assert_eq!(result["dimensionsFlattened"]["/group2"]["y"], 3);

    assert_eq!(counters.opened.get(), 3);
    assert!(counters.balanced());
}

#[test]
fn test_info_twice_gives_identical_metadata() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("grouped", true)],
        &["grouped"],
        BackendSet::new().with(Box::new(GroupedBackend {
            counters: counters.clone(),
        })),
    );

    let first = json(&inspector.file_info(&path));
    let second = json(&inspector.file_info(&path));
    for key in [
        "dimensionsFlattened",
        "variablesFlattened",
        "coordinatesFlattened",
        "attributesFlattened",
        "textReprFlattened",
        "markupReprFlattened",
        "textRepr",
    ] {
        assert_eq!(first["result"][key], second["result"][key], "{} differs", key);
    }
    assert!(counters.balanced());
}

#[test]
fn test_missing_dependency_touches_nothing() {
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("grouped", true)],
        &[],
        BackendSet::new().with(Box::new(GroupedBackend {
            counters: counters.clone(),
        })),
    );

    // The file does not exist: any I/O would turn this into a decode failure.
    let envelope = inspector.file_info(Path::new("/no/such/dir/sample.mock"));
    match envelope {
        Envelope::Error(error) => {
            assert_eq!(error.error_kind, ErrorKind::MissingDependency);
            assert!(!error.suggestion.is_empty());
            assert_eq!(error.format_info.missing_dependencies, vec!["grouped"]);
            assert!(error.format_info.available_backends.is_empty());
            assert!(!error.versions.is_empty());
        }
        Envelope::Result(_) => panic!("expected a missing dependency error"),
    }
    assert_eq!(counters.opened.get(), 0);
}

#[test]
fn test_unknown_extension_is_unsupported() {
    let inspector = inspector(vec![], &[], BackendSet::new());
    let value = json(&inspector.file_info(Path::new("/tmp/sample.unknown")));
    assert_eq!(value["error"]["errorKind"], "UnsupportedFormat");
    assert_eq!(value["error"]["formatInfo"]["displayName"], "Unknown");
}

#[test]
fn test_not_implemented_tree_falls_back_to_flat() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("flat", false)],
        &["flat"],
        BackendSet::new().with(Box::new(FlatOnlyBackend {
            counters: counters.clone(),
        })),
    );

    let value = json(&inspector.file_info(&path));
    assert_eq!(value["result"]["usedBackend"], "flat");
    assert_eq!(keys(&value["result"]["textReprFlattened"]), vec!["/"]);
    assert!(!value["result"]["textRepr"].as_str().unwrap().contains("Group:"));
    assert!(counters.balanced());
}

#[test]
fn test_failed_candidate_is_skipped() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let backends = BackendSet::new()
        .with(Box::new(FailingBackend {
            id: "broken",
            message: "bad magic number",
        }))
        .with(Box::new(FlatOnlyBackend {
            counters: counters.clone(),
        }));
    let inspector = inspector(
        vec![candidate("broken", false), candidate("flat", false)],
        &["broken", "flat"],
        backends,
    );

    let value = json(&inspector.file_info(&path));
    assert_eq!(value["result"]["usedBackend"], "flat");
    assert_eq!(value["result"]["formatInfo"]["availableBackends"], serde_json::json!(["broken", "flat"]));
}

#[test]
fn test_last_failure_is_surfaced() {
    let (_dir, path) = data_file();
    let backends = BackendSet::new()
        .with(Box::new(FailingBackend {
            id: "first",
            message: "first failure",
        }))
        .with(Box::new(FailingBackend {
            id: "second",
            message: "second failure",
        }));
    let inspector = inspector(
        vec![candidate("first", false), candidate("second", false)],
        &["first", "second"],
        backends,
    );

    let value = json(&inspector.file_info(&path));
    let message = value["error"]["message"].as_str().unwrap();
    assert_eq!(value["error"]["errorKind"], "DecodeFailure");
    assert!(message.contains("second failure"), "{}", message);
    assert!(!message.contains("first failure"));
    assert!(value["error"]["suggestion"].as_str().unwrap().contains("corrupted"));
}

#[test]
fn test_candidate_without_adapter_is_a_failure() {
    let (_dir, path) = data_file();
    let inspector = inspector(vec![candidate("ghost", false)], &["ghost"], BackendSet::new());
    let value = json(&inspector.file_info(&path));
    assert_eq!(value["error"]["errorKind"], "DecodeFailure");
    assert!(value["error"]["message"].as_str().unwrap().contains("ghost"));
}

#[test]
fn test_native_tree_is_normalized_and_closed() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("tree", false)],
        &["tree"],
        BackendSet::new().with(Box::new(TreeBackend {
            counters: counters.clone(),
            failing_group: None,
        })),
    );

    let value = json(&inspector.file_info(&path));
    assert_eq!(keys(&value["result"]["variablesFlattened"]), vec!["/", "/a", "/a/b"]);
    assert_eq!(counters.tree_closed.get(), 1);
    assert_eq!(counters.opened.get(), 3);
    assert!(counters.balanced());
}

#[test]
fn test_plot_nonexistent_variable_closes_everything() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("grouped", true)],
        &["grouped"],
        BackendSet::new().with(Box::new(GroupedBackend {
            counters: counters.clone(),
        })),
    );

    let value = json(&inspector.create_plot(&path, "/nonexistent", "auto", None));
    assert_eq!(value["error"]["errorKind"], "VariableNotFound");
    assert_eq!(value["error"]["formatInfo"]["extension"], ".mock");
    assert!(counters.opened.get() > 0);
    assert!(counters.balanced());

    let value = json(&inspector.create_plot(&path, "/group9/temp", "auto", None));
    assert_eq!(value["error"]["errorKind"], "VariableNotFound");
    assert!(counters.balanced());
}

#[test]
fn test_plot_variable_in_subgroup() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("grouped", true)],
        &["grouped"],
        BackendSet::new().with(Box::new(GroupedBackend {
            counters: counters.clone(),
        })),
    );

    let value = json(&inspector.create_plot(&path, "group1/temp", "auto", Some("ggplot")));
    let result = &value["result"];
    assert_eq!(result["strategy"]["kind"], "single");
    assert!(!result["plotData"].as_str().unwrap().is_empty());
    assert!(counters.balanced());

    // coordinates are plottable too
    let value = json(&inspector.create_plot(&path, "/x", "auto", None));
    assert_eq!(value["result"]["strategy"]["kind"], "fallback");
}

#[test]
fn test_plot_strategies_follow_shape() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("flat", false)],
        &["flat"],
        BackendSet::new().with(Box::new(FlatOnlyBackend {
            counters: counters.clone(),
        })),
    );
    let value = json(&inspector.create_plot(&path, "/temp", "auto", Some("no-such-style")));
    assert_eq!(value["result"]["strategy"]["kind"], "single");
    assert_eq!(value["result"]["strategy"]["dropLeading"], "time");

    let counters = Counters::default();
    let inspector = inspector_for_tree(&counters);
    let value = json(&inspector.create_plot(&path, "/a/b/temp", "auto", None));
    let strategy = &value["result"]["strategy"];
    assert_eq!(strategy["kind"], "facet-two-axis");
    assert_eq!(strategy["row"]["dimension"], "t");
    assert_eq!(strategy["row"]["extent"], 3);
    assert_eq!(strategy["col"]["dimension"], "z");
    assert_eq!(strategy["col"]["extent"], 2);
    assert!(counters.balanced());
    assert_eq!(counters.tree_closed.get(), 1);
}

fn inspector_for_tree(counters: &Counters) -> Inspector {
    inspector(
        vec![candidate("tree", false)],
        &["tree"],
        BackendSet::new().with(Box::new(TreeBackend {
            counters: counters.clone(),
            failing_group: None,
        })),
    )
}

#[test]
fn test_plot_type_must_be_auto() {
    let counters = Counters::default();
    let inspector = inspector_for_tree(&counters);
    let value = json(&inspector.create_plot(Path::new("/no/such/file.mock"), "/temp", "contour", None));
    assert_eq!(value["error"]["errorKind"], "InvalidRequest");
    assert_eq!(counters.opened.get(), 0);
}

#[test]
fn test_read_failure_after_open_is_a_decode_failure() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("unreadable", true)],
        &["unreadable"],
        BackendSet::new().with(Box::new(UnreadableBackend {
            counters: counters.clone(),
        })),
    );

    // metadata alone never touches values
    assert!(inspector.file_info(&path).is_ok());

    let value = json(&inspector.create_plot(&path, "/temp", "auto", None));
    assert_eq!(value["error"]["errorKind"], "DecodeFailure");
    assert!(value["error"]["message"].as_str().unwrap().contains("checksum mismatch in 'temp'"));
    assert_eq!(value["error"]["formatInfo"]["extension"], ".mock");
    assert_eq!(counters.opened.get(), 2);
    assert!(counters.balanced());
}

#[test]
fn test_group_failure_during_normalization_closes_everything() {
    let (_dir, path) = data_file();
    let counters = Counters::default();
    let inspector = inspector(
        vec![candidate("tree", false)],
        &["tree"],
        BackendSet::new().with(Box::new(TreeBackend {
            counters: counters.clone(),
            failing_group: Some("/a"),
        })),
    );

    let value = json(&inspector.file_info(&path));
    assert_eq!(value["error"]["errorKind"], "DecodeFailure");
    assert!(value["error"]["message"].as_str().unwrap().contains("group '/a' is truncated"));
    // the root table was built before the failure and must be released
    assert_eq!(counters.opened.get(), 1);
    assert!(counters.balanced());
    assert_eq!(counters.tree_closed.get(), 1);

    let value = json(&inspector.create_plot(&path, "/temp", "auto", None));
    assert_eq!(value["error"]["errorKind"], "DecodeFailure");
    assert!(counters.balanced());
    assert_eq!(counters.tree_closed.get(), 2);
}
