use std::fs;
use std::path::Path;
use std::process::Command;

fn galapago() -> Command {
    Command::new(env!("CARGO_BIN_EXE_galapago"))
}

/// `n` dimuon events; even events are opposite-sign Z candidates.
fn write_events(path: &Path, n: usize) {
    let mut text = String::new();
    for i in 0..n {
        let q2 = if i % 2 == 0 { -1 } else { 1 };
        text.push_str(&format!(
            "{{\"genWeight\": 1.0, \"nMuon\": 2, \"Muon_charge\": [1, {}], \"Muon_pt\": [45.6, 45.6], \
             \"Muon_eta\": [0.0, 0.0], \"Muon_phi\": [0.0, 3.141592653589793], \"Muon_mass\": [0.10566, 0.10566]}}\n",
            q2
        ));
    }
    fs::write(path, text).unwrap();
}

fn setup(dir: &Path) -> std::path::PathBuf {
    write_events(&dir.join("data.ndjson"), 20);
    fs::create_dir_all(dir.join("dy")).unwrap();
    write_events(&dir.join("dy/a.ndjson"), 10);
    write_events(&dir.join("dy/b.ndjson"), 10);

    let dat = dir.join("samples.dat");
    fs::write(
        &dat,
        format!(
            "# block color name label locator xsec isdata\n\
             DATA kBlack Muon0_Run2024I_v1 Data {} 1 1\n\
             DY kAzure+1 DYJetsToLL_M-50 Drell-Yan {} 6077.22 0\n\
             broken line\n",
            dir.join("data.ndjson").display(),
            dir.join("dy").display(),
        ),
    )
    .unwrap();
    dat
}

#[test]
fn harvest_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let dat = setup(dir.path());
    let out = dir.path().join("plots");

    let output = galapago()
        .args(["--log-level", "warn", "harvest", "--no-ratio", "--lumi", "1.0"])
        .arg("--dat")
        .arg(&dat)
        .arg("--output")
        .arg(&out)
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Data: 10 events"), "{}", stdout);
    // 10 opposite-sign of 20 generated: half the cross-section.
    assert!(stdout.contains("MC:   3038.6 events"), "{}", stdout);

    let html = fs::read_to_string(out.join("DiMuon_mass.html")).unwrap();
    assert!(html.contains("\"ratio\":false"));
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("DiMuon_mass.json")).unwrap()).unwrap();
    assert_eq!(json["edges"].as_array().unwrap().len(), 101);
    assert_eq!(json["mc"][0]["label"], "Drell-Yan");
}

#[test]
fn strict_mode_rejects_malformed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let dat = setup(dir.path());
    let output = galapago()
        .args(["yields", "--strict"])
        .arg("--dat")
        .arg(&dat)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("malformed definition"));
}

#[test]
fn yields_with_cuts() {
    let dir = tempfile::tempdir().unwrap();
    let dat = setup(dir.path());
    let output = galapago()
        .args(["yields", "--test", "--nfiles", "1", "--lumi", "1", "--dimuon"])
        .args(["--cut", "Muon_charge[0]*Muon_charge[1] < 0", "--cut", "DiMuon_mass > 80"])
        .arg("--dat")
        .arg(&dat)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Data: 10 of 20 events pass.
    assert!(stdout.contains("10.000 +- 3.162"), "{}", stdout);
    // One DY file: 5 of 10 events, each weighted 607.722.
    assert!(stdout.contains("3038.610"), "{}", stdout);
}

#[test]
fn resolve_prints_files() {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let output = galapago()
        .arg("resolve")
        .arg(dir.path().join("dy"))
        .args(["--limit", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.trim_end().ends_with("a.ndjson"));

    let missing = galapago().args(["resolve", "nothing/here/*.ndjson"]).output().unwrap();
    assert!(!missing.status.success());
}

#[test]
fn histogram_with_edges_and_weight() {
    let dir = tempfile::tempdir().unwrap();
    let dat = setup(dir.path());
    let out = dir.path().join("plots");

    let output = galapago()
        .args(["--log-level", "warn", "histogram", "--lumi", "1"])
        .args(["--var", "Muon_pt[0]", "--name", "lead_pt", "--edges", "0,40,50,200"])
        .args(["--cut", "Muon_charge[0]*Muon_charge[1] < 0", "--weight", "2"])
        .arg("--dat")
        .arg(&dat)
        .arg("--output")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    // The weight expression replaces the normalized weight on both sides.
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Data: 20 events"), "{}", stdout);
    assert!(stdout.contains("MC:   20.0 events"), "{}", stdout);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("lead_pt.json")).unwrap()).unwrap();
    assert_eq!(json["edges"], serde_json::json!([0.0, 40.0, 50.0, 200.0]));
    assert_eq!(json["data"]["sumw"], serde_json::json!([0.0, 20.0, 0.0]));
}

#[test]
fn histogram_needs_a_binning() {
    let dir = tempfile::tempdir().unwrap();
    let dat = setup(dir.path());
    let output = galapago()
        .args(["histogram", "--var", "nMuon"])
        .arg("--dat")
        .arg(&dat)
        .arg("--output")
        .arg(dir.path().join("plots"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("range"));
}

#[test]
fn histogram2d_writes_one_histogram_per_tree() {
    let dir = tempfile::tempdir().unwrap();
    let dat = setup(dir.path());
    let out = dir.path().join("plots");

    let output = galapago()
        .args(["--log-level", "warn", "histogram2d", "--lumi", "1", "--name", "charge_vs_pt"])
        .args(["--x", "Muon_pt[0]", "--x-bins", "10", "--x-range", "0", "100"])
        .args(["--y", "Muon_charge[1]", "--y-edges=-2,0,2"])
        .arg("--dat")
        .arg(&dat)
        .arg("--output")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("peak [40, 50) x [-2, 0): 10.000 +- 3.162"), "{}", stdout);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("charge_vs_pt.json")).unwrap()).unwrap();
    let hists = json.as_array().unwrap();
    assert_eq!(hists.len(), 2);
    assert_eq!(hists[0]["label"], "DATA");
    assert_eq!(hists[1]["label"], "MC");

    // x bin 4 holds every event, split evenly between the two charges.
    let data = hists[0]["sumw"].as_array().unwrap();
    assert_eq!(data.len(), 20);
    assert_eq!(data[8], 10.0);
    assert_eq!(data[9], 10.0);
    let mc = hists[1]["sumw"].as_array().unwrap();
    assert!((mc[8].as_f64().unwrap() - 3038.61).abs() < 1e-6);
}

#[test]
fn yields_n_minus_one() {
    let dir = tempfile::tempdir().unwrap();
    let dat = setup(dir.path());
    let output = galapago()
        .args(["yields", "--lumi", "1", "--dimuon", "--n-minus-one"])
        .args(["--cut", "Muon_charge[0]*Muon_charge[1] < 0", "--cut", "DiMuon_mass > 100"])
        .arg("--dat")
        .arg(&dat)
        .arg("--cache-dir")
        .arg(dir.path().join("cache"))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let data: Vec<&str> = stdout.lines().skip_while(|l| *l != "DATA").take(5).collect();

    // Dropping the charge cut keeps the mass cut, which passes nothing.
    assert!(data[1].contains("without Muon_charge") && data[1].contains(" 0.000 +-"), "{}", stdout);
    // Dropping the mass cut leaves the opposite-sign half.
    assert!(data[2].contains("without DiMuon_mass > 100") && data[2].contains("10.000 +- 3.162"), "{}", stdout);
    assert!(data[4].contains("total") && data[4].contains(" 0.000 +-"), "{}", stdout);
}
