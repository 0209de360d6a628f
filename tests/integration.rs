use std::{env, fs, path::PathBuf, process::Command};

#[test]
fn basic_workflow() {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("basic_workflow");

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");

    let config_path = test_dir.join("config.toml");
    let config_contents = String::new()
        + "[model]\n"
        + "kind = \"fraction\"\n"
        + "n_interact = 50.0\n"
        + "\n"
        + "[init]\n"
        + "state = [ 0.4, 0.3, 0.2, 0.1,]\n"
        + "\n"
        + "[regimes.holiday]\n"
        + "matrix = [ [ 0.0, 0.4, 0.65, 0.55,], [ 0.3, 0.0, -0.3, -0.3,], \
           [ 0.6, 0.0, 0.2, 0.0,], [ 0.55, 0.0, -0.6, 0.4,],]\n"
        + "cost = [ 1.0, 1.3, 1.2, 1.4,]\n"
        + "\n"
        + "[regimes.drug]\n"
        + "matrix = [ [ 0.0, 0.4, 0.65, 0.55,], [ 0.3, 0.0, -0.3, -0.3,], \
           [ 0.6, 0.0, 0.2, 0.0,], [ 0.55, 0.0, -0.6, 0.4,],]\n"
        + "cost = [ 1.0, 1.3, 1.2, 1.4,]\n"
        + "wmmd_ih = 0.4\n"
        + "\n"
        + "[schedule]\n"
        + "settle = { regime = \"holiday\", duration = 20.0 }\n"
        + "phases = [ { regime = \"drug\", duration = 5.0 }, \
           { regime = \"holiday\", duration = 5.0 },]\n"
        + "n_cycles = 4\n"
        + "\n"
        + "[optimize]\n"
        + "max_iters = 5\n"
        + "\n"
        + "[[optimize.variables]]\n"
        + "target = { kind = \"duration\", phase = 0 }\n"
        + "initial = 5.0\n"
        + "lower = 2.0\n"
        + "upper = 10.0\n"
        + "\n"
        + "[[sweep.axes]]\n"
        + "target = { kind = \"duration\", phase = 0 }\n"
        + "start = 2.0\n"
        + "stop = 4.0\n"
        + "step = 2.0\n"
        + "\n"
        + "[[sweep.axes]]\n"
        + "target = { kind = \"wmmd_ih\", phase = 0 }\n"
        + "start = 0.2\n"
        + "stop = 0.4\n"
        + "step = 0.2\n";

    fs::write(&config_path, config_contents).expect("failed to write config file");

    fn run_bin(args: &[&str]) {
        let bin = PathBuf::from(env!("CARGO_BIN_EXE_mmtherapy"));

        let output = Command::new(bin)
            .args(args)
            .output()
            .expect("failed to execute command");

        let stdout_str =
            std::str::from_utf8(&output.stdout).expect("failed to convert stdout to string");
        let stderr_str =
            std::str::from_utf8(&output.stderr).expect("failed to convert stderr to string");

        assert!(
            output.status.success(),
            "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
        );
    }

    let test_dir_str = test_dir
        .to_str()
        .expect("failed to convert test directory to string");

    let outputs = [
        "trajectory.msgpack",
        "simulation.json",
        "optimize.json",
        "sweep.json",
    ];

    run_bin(&["--sim-dir", test_dir_str, "simulate"]);
    run_bin(&["--sim-dir", test_dir_str, "optimize"]);
    run_bin(&["--sim-dir", test_dir_str, "sweep"]);

    for file in outputs {
        assert!(test_dir.join(file).exists(), "missing {file}");
    }

    let sweep_str = fs::read_to_string(test_dir.join("sweep.json")).expect("failed to read sweep");
    let sweep: serde_json::Value = serde_json::from_str(&sweep_str).expect("failed to parse sweep");
    let points = sweep["points"].as_array().expect("points must be an array");
    assert_eq!(points.len(), 4);

    run_bin(&["--sim-dir", test_dir_str, "clean"]);

    for file in outputs {
        assert!(!test_dir.join(file).exists(), "{file} was not removed");
    }
    assert!(config_path.exists());

    fs::remove_dir_all(&test_dir).ok();
}
