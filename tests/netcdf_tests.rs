#![cfg(feature = "netcdf")]
//! netCDF files created through the `netcdf` crate in temporary directories.

use ndarray::{Array1, Array2, Array3};
use netcdf::create;
use sci_data_viewer::service::Inspector;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

fn write_sample(path: &Path) {
    let mut file = create(path).expect("Failed to create NetCDF file");
    file.add_attribute("title", "netCDF sample")
        .expect("Failed to add global attribute");

    file.add_dimension("time", 1).expect("Failed to add dimension time");
    file.add_dimension("lat", 3).expect("Failed to add dimension lat");
    file.add_dimension("lon", 4).expect("Failed to add dimension lon");

    let mut lat = file
        .add_variable::<f32>("lat", &["lat"])
        .expect("Failed to add variable lat");
    lat.put(Array1::from(vec![-10.0f32, 0.0, 10.0]).view(), ..)
        .expect("Failed to write lat");

    let mut temp = file
        .add_variable::<f32>("temp", &["time", "lat", "lon"])
        .expect("Failed to add variable temp");
    temp.put_attribute("units", "K").expect("Failed to add units");
    let values = Array3::from_shape_fn((1, 3, 4), |(_, y, x)| 280.0 + (y * 4 + x) as f32);
    temp.put(values.view(), ..).expect("Failed to write temp");

    let mut group = file.add_group("group1").expect("Failed to add group");
    group.add_dimension("y", 2).expect("Failed to add dimension y");
    group.add_dimension("x", 2).expect("Failed to add dimension x");
    let mut pressure = group
        .add_variable::<f64>("pressure", &["y", "x"])
        .expect("Failed to add variable pressure");
    pressure
        .put(Array2::from_shape_vec((2, 2), vec![1000.0, 990.0, 980.0, 970.0]).unwrap().view(), ..)
        .expect("Failed to write pressure");
}

fn sample_file() -> (TempDir, PathBuf) {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("sample.nc");
    write_sample(&path);
    (dir, path)
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap()
}

#[test]
fn test_info_on_netcdf4_groups() {
    let (_dir, path) = sample_file();
    let value = to_json(&Inspector::default().file_info(&path));
    let result = &value["result"];

    assert_eq!(result["usedBackend"], "netcdf");
    assert_eq!(result["formatInfo"]["displayName"], "NetCDF");
    assert_eq!(result["attributesFlattened"]["/"]["title"], "netCDF sample");
    assert_eq!(result["dimensionsFlattened"]["/"], json!({"lat": 3, "lon": 4, "time": 1}));
    assert_eq!(result["dimensionsFlattened"]["/group1"], json!({"x": 2, "y": 2}));

    let temp = &result["variablesFlattened"]["/"][0];
    assert_eq!(temp["name"], "temp");
    assert_eq!(temp["elementType"], "float32");
    assert_eq!(temp["shape"], json!([1, 3, 4]));
    assert_eq!(temp["sizeBytes"], 48);
    assert_eq!(temp["attributes"]["units"], "K");
    assert_eq!(result["coordinatesFlattened"]["/"][0]["name"], "lat");
    assert_eq!(result["variablesFlattened"]["/group1"][0]["elementType"], "float64");
    assert!(result["textRepr"].as_str().unwrap().contains("Group: /group1"));
}

#[test]
fn test_plot_netcdf_variables() {
    let (_dir, path) = sample_file();
    let inspector = Inspector::default();

    let value = to_json(&inspector.create_plot(&path, "/temp", "auto", None));
    assert_eq!(value["result"]["strategy"]["kind"], "single");
    assert_eq!(value["result"]["strategy"]["dropLeading"], "time");

    let value = to_json(&inspector.create_plot(&path, "/group1/pressure", "auto", Some("dark_background")));
    assert_eq!(value["result"]["strategy"]["kind"], "single");

    let value = to_json(&inspector.create_plot(&path, "/nonexistent", "auto", None));
    assert_eq!(value["error"]["errorKind"], "VariableNotFound");
}

#[test]
fn test_corrupted_file_is_a_decode_failure() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("broken.nc");
    std::fs::write(&path, b"this is not a netCDF file").unwrap();

    let value = to_json(&Inspector::default().file_info(&path));
    assert_eq!(value["error"]["errorKind"], "DecodeFailure");
    assert!(value["error"]["suggestion"].as_str().unwrap().contains("corrupted"));
    assert_eq!(value["error"]["formatInfo"]["availableBackends"], json!(["netcdf"]));
}
