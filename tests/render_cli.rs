use std::fs;
use std::path::PathBuf;
use std::process::Command;

use tempfile::tempdir;

fn demos() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos")
}

fn render() -> Command {
    Command::new(env!("CARGO_BIN_EXE_render"))
}

#[test]
fn writes_linker_script() {
    let dir = tempdir().unwrap();
    let link_x = dir.path().join("link.x");
    let status = render()
        .arg(demos().join("rt685s-evk.json"))
        .arg("--sizes")
        .arg(demos().join("rt685s-evk.sizes.json"))
        .args(["--format", "ld", "--output"])
        .arg(&link_x)
        .status()
        .unwrap();
    assert!(status.success());

    let script = fs::read_to_string(&link_x).unwrap();
    assert!(script.starts_with("/* Generated by imxrt-rt-layout"));
    assert!(script.contains("\t.flexspi_code 0x20080000 : AT(0x800CA68)\n"));
}

#[test]
fn json_output_round_trips_through_serde() {
    let output = render()
        .arg(demos().join("rt685s-evk.json"))
        .arg("--sizes")
        .arg(demos().join("rt685s-evk.sizes.json"))
        .args(["--format", "json", "--keep", "text,bss"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let map: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = map["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        ["otfad", "fcb", "biv", "keystore", "vector_table", "text", "bss"]
    );
    assert_eq!(map["discarded"].as_array().unwrap().len(), 5);
}

#[test]
fn reports_every_violation_and_fails() {
    let dir = tempdir().unwrap();
    let manifest = dir.path().join("tight.json");
    fs::write(
        &manifest,
        r#"{
            "regions": [{ "name": "RAM", "origin": "0x20000000", "length": "0x100" }],
            "sections": [
                { "name": "data", "storage": "RAM", "size": "0x80" },
                { "name": "bss", "storage": "RAM", "size": "0x100" },
                { "name": "stack", "storage": "DTCM", "size": "0x100" }
            ]
        }"#,
    )
    .unwrap();

    let output = render()
        .arg(&manifest)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let kinds: Vec<&str> = report["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["RegionOverflow", "UnknownRegion"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("section \"bss\" needs"), "{}", stderr);
}

#[test]
fn rejects_wide_addresses_unless_asked() {
    let dir = tempdir().unwrap();
    let manifest = dir.path().join("wide.json");
    fs::write(
        &manifest,
        r#"{
            "regions": [{ "name": "DDR", "origin": "0x1_0000_0000", "length": "1G" }],
            "sections": [{ "name": "heap", "storage": "DDR", "size": "1M" }]
        }"#,
    )
    .unwrap();

    let narrow = render().arg(&manifest).output().unwrap();
    assert!(!narrow.status.success());

    let wide = render()
        .arg(&manifest)
        .args(["--address-width", "64"])
        .output()
        .unwrap();
    assert!(wide.status.success());
    let text = String::from_utf8(wide.stdout).unwrap();
    assert!(text.contains("0x100000000"), "{}", text);
}

#[test]
fn rejected_layout_keeps_previous_output() {
    let dir = tempdir().unwrap();
    let manifest = dir.path().join("overflow.json");
    fs::write(
        &manifest,
        r#"{
            "regions": [{ "name": "RAM", "origin": "0x20000000", "length": "0x10" }],
            "sections": [{ "name": "bss", "storage": "RAM", "size": "0x20" }]
        }"#,
    )
    .unwrap();

    for format in ["ld", "json", "text"] {
        let link_x = dir.path().join(format!("link.{}", format));
        fs::write(&link_x, "previous good link.x\n").unwrap();
        let output = render()
            .arg(&manifest)
            .args(["--format", format, "--output"])
            .arg(&link_x)
            .output()
            .unwrap();
        assert!(!output.status.success());
        assert_eq!(
            fs::read_to_string(&link_x).unwrap(),
            "previous good link.x\n",
            "--format {}",
            format
        );
    }
}

#[test]
fn linker_script_has_no_load_region_on_split_sections() {
    let output = render()
        .arg(demos().join("rt685s-evk.json"))
        .arg("--sizes")
        .arg(demos().join("rt685s-evk.sizes.json"))
        .args(["--format", "ld"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let script = String::from_utf8(output.stdout).unwrap();
    assert!(script.contains("\t__end_flexspi_code = .;\n\t} > RAM\n"));
    assert!(!script.contains("AT>"), "{}", script);
}
