//! Integration tests for the full publish pipeline with a scripted backend

use crate::helpers::{Dep, TestWorkspace, cargo_calls};
use anyhow::Result;
use cargo_shipyard::ShipyardError;
use cargo_shipyard::commands::plan::build_plan;
use cargo_shipyard::commands::{PublishArgs, publish_workspace};
use cargo_shipyard::core::error::{ExecError, ExitCode, StageError};
use cargo_shipyard::exec::{Scripted, ScriptedRunner};
use cargo_shipyard::release::{PreflightRunner, PublishOutcome, WorkspaceStager};

fn three_crate_workspace() -> Result<TestWorkspace> {
  let mut ws = TestWorkspace::new()?;
  ws.add_crate("app", &[Dep::Normal("utils"), Dep::Normal("core")])?;
  ws.add_crate("utils", &[Dep::Normal("core")])?;
  ws.add_crate("core", &[])?;
  Ok(ws)
}

fn args(ws: &TestWorkspace) -> PublishArgs {
  PublishArgs {
    build_dir: Some(ws.scratch().join("build")),
    ..PublishArgs::default()
  }
}

/// Every call after `cargo metadata`, as "<args without paths> <cwd dir name>"
fn steps(runner: &ScriptedRunner) -> Vec<String> {
  runner
    .calls()
    .into_iter()
    .skip(1)
    .map(|call| {
      let words: Vec<&str> = call.command[1..]
        .iter()
        .map(String::as_str)
        .filter(|arg| !arg.contains('/'))
        .collect();
      let dir = call
        .cwd
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
      format!("{} {}", words.join(" "), dir)
    })
    .collect()
}

fn outcomes(report: &cargo_shipyard::release::PublishReport) -> Vec<(&str, PublishOutcome)> {
  report
    .outcomes
    .iter()
    .map(|(name, outcome)| (name.as_str(), outcome.clone()))
    .collect()
}

#[test]
fn test_dry_run_pipeline_command_sequence() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  let report = publish_workspace(&ctx, &runner, &args(&ws))?;

  assert_eq!(
    steps(&runner),
    vec![
      "check --workspace --all-targets --target-dir ws",
      "test --workspace --all-targets --target-dir ws",
      "package --allow-dirty core",
      "publish --allow-dirty --dry-run core",
      "package --allow-dirty utils",
      "publish --allow-dirty --dry-run utils",
      "package --allow-dirty app",
      "publish --allow-dirty --dry-run app",
    ]
  );
  assert_eq!(
    outcomes(&report),
    vec![
      ("core", PublishOutcome::Verified),
      ("utils", PublishOutcome::Verified),
      ("app", PublishOutcome::Verified),
    ]
  );

  // Builds go to <build-dir>/target, never into the live workspace
  let check = &cargo_calls(&runner, "check")[0];
  let target_dir = check.last().expect("target dir argument");
  assert!(target_dir.ends_with("build/target"), "unexpected target dir {}", target_dir);
  assert!(!ws.path.join("target").exists());
  Ok(())
}

#[test]
fn test_live_publish_runs_dry_run_first() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("shipyard.toml", "[publish]\nregistry = \"internal\"\n")?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  let report = publish_workspace(
    &ctx,
    &runner,
    &PublishArgs {
      live: true,
      ..args(&ws)
    },
  )?;

  let publishes = cargo_calls(&runner, "publish");
  assert_eq!(publishes.len(), 6);
  assert_eq!(
    publishes[0],
    vec!["cargo", "publish", "--allow-dirty", "--dry-run", "--registry", "internal"]
  );
  assert_eq!(publishes[1], vec!["cargo", "publish", "--allow-dirty", "--registry", "internal"]);
  assert_eq!(report.count(&PublishOutcome::Published), 3);
  Ok(())
}

#[test]
fn test_live_publish_without_dry_run_first() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("shipyard.toml", "[publish]\ndry_run_first = false\n")?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  publish_workspace(
    &ctx,
    &runner,
    &PublishArgs {
      live: true,
      ..args(&ws)
    },
  )?;

  let publishes = cargo_calls(&runner, "publish");
  assert_eq!(publishes.len(), 3);
  assert!(publishes.iter().all(|c| !c.contains(&"--dry-run".to_string())));
  Ok(())
}

#[test]
fn test_already_published_crate_is_skipped() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.serve_metadata(
    ScriptedRunner::new()
      .once_prefix(&["cargo", "publish"], Scripted::success(""))
      .once_prefix(
        &["cargo", "publish"],
        Scripted::failure(101, "error: crate version `0.1.0` is already uploaded"),
      ),
  );
  let ctx = ws.context(&runner)?;

  let report = publish_workspace(&ctx, &runner, &args(&ws))?;

  assert_eq!(
    outcomes(&report),
    vec![
      ("core", PublishOutcome::Verified),
      ("utils", PublishOutcome::AlreadyPublished),
      ("app", PublishOutcome::Verified),
    ]
  );
  // app is still packaged and published after the skip
  assert_eq!(cargo_calls(&runner, "package").len(), 3);
  assert_eq!(cargo_calls(&runner, "publish").len(), 3);
  Ok(())
}

#[test]
fn test_live_already_published_crate_skips_upload() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.serve_metadata(ScriptedRunner::new().once_prefix(
    &["cargo", "publish", "--allow-dirty", "--dry-run"],
    Scripted::failure(101, "error: crate core@0.1.0 already exists on crates.io index"),
  ));
  let ctx = ws.context(&runner)?;

  let report = publish_workspace(
    &ctx,
    &runner,
    &PublishArgs {
      live: true,
      ..args(&ws)
    },
  )?;

  assert_eq!(
    outcomes(&report),
    vec![
      ("core", PublishOutcome::AlreadyPublished),
      ("utils", PublishOutcome::Published),
      ("app", PublishOutcome::Published),
    ]
  );
  let publishes: Vec<String> = steps(&runner).into_iter().filter(|s| s.starts_with("publish")).collect();
  assert_eq!(
    publishes,
    vec![
      "publish --allow-dirty --dry-run core",
      "publish --allow-dirty --dry-run utils",
      "publish --allow-dirty utils",
      "publish --allow-dirty --dry-run app",
      "publish --allow-dirty app",
    ]
  );
  Ok(())
}

#[test]
fn test_configured_marker_counts_as_already_published() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write(
    "shipyard.toml",
    "[publish]\nextra_already_published_markers = [\"Version Exists\"]\n",
  )?;
  let runner = ws.serve_metadata(ScriptedRunner::new().once_prefix(
    &["cargo", "publish"],
    Scripted::output(1, "registry says: version exists", ""),
  ));
  let ctx = ws.context(&runner)?;

  let report = publish_workspace(&ctx, &runner, &args(&ws))?;
  assert_eq!(report.outcomes[0], ("core".to_string(), PublishOutcome::AlreadyPublished));
  assert_eq!(report.count(&PublishOutcome::Verified), 2);
  Ok(())
}

#[test]
fn test_publish_failure_aborts_remaining_crates() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.serve_metadata(ScriptedRunner::new().once_prefix(
    &["cargo", "publish"],
    Scripted::failure(101, "error: failed to verify package tarball"),
  ));
  let ctx = ws.context(&runner)?;

  let err = publish_workspace(&ctx, &runner, &args(&ws)).unwrap_err();

  match &err {
    ShipyardError::Exec(ExecError::CommandFailed { summary, output, .. }) => {
      assert_eq!(summary, "Publishing `core` failed");
      assert!(output.contains("failed to verify package tarball"));
    }
    other => panic!("expected a command failure, got: {other}"),
  }
  assert_eq!(cargo_calls(&runner, "package").len(), 1);
  Ok(())
}

#[test]
fn test_package_failure_is_never_skipped() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.serve_metadata(ScriptedRunner::new().once_prefix(
    &["cargo", "package"],
    Scripted::failure(101, "error: file already exists in archive"),
  ));
  let ctx = ws.context(&runner)?;

  let err = publish_workspace(&ctx, &runner, &args(&ws)).unwrap_err();
  assert!(err.to_string().contains("Packaging `core` failed"));
  assert!(cargo_calls(&runner, "publish").is_empty());
  Ok(())
}

#[test]
fn test_nested_build_dir_rejected_before_any_command() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  let err = publish_workspace(
    &ctx,
    &runner,
    &PublishArgs {
      build_dir: Some(ws.path.join("target/shipyard")),
      ..PublishArgs::default()
    },
  )
  .unwrap_err();

  assert!(matches!(err, ShipyardError::Stage(StageError::BuildDirInsideWorkspace { .. })));
  assert_eq!(err.exit_code(), ExitCode::System);
  // Only the metadata query ran
  assert_eq!(runner.calls().len(), 1);
  Ok(())
}

#[test]
fn test_dirty_tree_forbidden() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.serve_metadata(ScriptedRunner::new().on_prefix(&["git"], Scripted::success(" M crates/core/src/lib.rs\n")));
  let ctx = ws.context(&runner)?;

  let err = publish_workspace(
    &ctx,
    &runner,
    &PublishArgs {
      forbid_dirty: true,
      ..args(&ws)
    },
  )
  .unwrap_err();

  match &err {
    ShipyardError::Exec(ExecError::DirtyTree { status }) => assert!(status.contains("crates/core/src/lib.rs")),
    other => panic!("expected a dirty tree error, got: {other}"),
  }
  assert_eq!(err.exit_code(), ExitCode::Validation);
  assert!(cargo_calls(&runner, "check").is_empty());
  Ok(())
}

#[test]
fn test_clean_tree_check_runs_against_live_workspace() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.serve_metadata(ScriptedRunner::new().on_prefix(&["git"], Scripted::success("")));
  let ctx = ws.context(&runner)?;

  publish_workspace(
    &ctx,
    &runner,
    &PublishArgs {
      forbid_dirty: true,
      ..args(&ws)
    },
  )?;

  let git = &runner.calls()[1];
  assert_eq!(git.command[0], "git");
  assert!(git.command.contains(&"--porcelain".to_string()));
  assert!(git.command.iter().any(|arg| arg == &ws.path.display().to_string()));
  Ok(())
}

#[test]
fn test_dirty_tree_ignored_without_flag() -> Result<()> {
  let ws = three_crate_workspace()?;
  let runner = ws.serve_metadata(ScriptedRunner::new().on_prefix(&["git"], Scripted::success(" M Cargo.toml\n")));
  let ctx = ws.context(&runner)?;

  publish_workspace(&ctx, &runner, &args(&ws))?;
  assert!(runner.commands().iter().all(|c| c[0] != "git"));
  Ok(())
}

#[test]
fn test_aux_commands_run_before_check() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write(
    "shipyard.toml",
    "[preflight]\naux_commands = [[\"cargo\", \"build\", \"-p\", \"lint-helper\"]]\n",
  )?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  publish_workspace(&ctx, &runner, &args(&ws))?;

  let steps = steps(&runner);
  assert_eq!(steps[0], "build -p lint-helper ws");
  assert!(steps[1].starts_with("check "));
  Ok(())
}

#[test]
fn test_aux_command_failure_aborts() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("shipyard.toml", "[preflight]\naux_commands = [[\"make\", \"helpers\"]]\n")?;
  let runner = ws.serve_metadata(ScriptedRunner::new().on(&["make", "helpers"], Scripted::failure(2, "make: *** No rule")));
  let ctx = ws.context(&runner)?;

  let err = publish_workspace(&ctx, &runner, &args(&ws)).unwrap_err();
  assert!(err.to_string().contains("Auxiliary build command failed"));
  assert!(cargo_calls(&runner, "check").is_empty());
  Ok(())
}

#[test]
fn test_preflight_skip_goes_straight_to_packaging() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("shipyard.toml", "[preflight]\nskip = true\n")?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  publish_workspace(&ctx, &runner, &args(&ws))?;

  assert!(cargo_calls(&runner, "check").is_empty());
  assert!(cargo_calls(&runner, "test").is_empty());
  assert_eq!(cargo_calls(&runner, "package").len(), 3);
  Ok(())
}

#[test]
fn test_test_failure_reports_artifacts() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("reports/failure.log", "setup ok\nassertion failed: left == right\n")?;
  let runner = ws.serve_metadata(ScriptedRunner::new().on_prefix(
    &["cargo", "test"],
    Scripted::output(
      101,
      "running 3 tests\n",
      "test failed, details in reports/failure.log and reports/missing.txt\n",
    ),
  ));
  let ctx = ws.context(&runner)?;

  let err = publish_workspace(&ctx, &runner, &args(&ws)).unwrap_err();

  let ShipyardError::Exec(ExecError::CommandFailed {
    summary,
    exit_code,
    output,
    ..
  }) = &err
  else {
    panic!("expected a command failure, got: {err}");
  };
  assert_eq!(summary, "cargo test failed");
  assert_eq!(*exit_code, 101);
  assert!(output.contains("Diagnostic artifacts:"));
  assert!(output.contains("failure.log (exists, last 2 lines):\nsetup ok\nassertion failed: left == right"));
  assert!(output.contains("missing.txt (missing)"));
  assert!(cargo_calls(&runner, "package").is_empty());
  Ok(())
}

#[test]
fn test_timeout_is_reported_distinctly() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("shipyard.toml", "[preflight]\ntimeout_secs = 5\n")?;
  let runner = ws.serve_metadata(ScriptedRunner::new().on_prefix(&["cargo", "check"], Scripted::Timeout));
  let ctx = ws.context(&runner)?;

  let err = publish_workspace(&ctx, &runner, &args(&ws)).unwrap_err();
  match &err {
    ShipyardError::Exec(ExecError::Timeout { timeout, .. }) => assert_eq!(timeout.as_secs(), 5),
    other => panic!("expected a timeout, got: {other}"),
  }
  assert!(cargo_calls(&runner, "test").is_empty());
  Ok(())
}

#[test]
fn test_empty_plan_runs_nothing() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("shipyard.toml", "[publish]\nexclude = [\"core\", \"utils\", \"app\"]\n")?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  let report = publish_workspace(&ctx, &runner, &args(&ws))?;
  assert!(report.outcomes.is_empty());
  assert_eq!(runner.calls().len(), 1);
  assert!(!ws.scratch().join("build").exists());
  Ok(())
}

#[test]
fn test_test_invocation_scope_and_externs() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write(
    "shipyard.toml",
    r#"
[preflight]
unit_tests_only = true
exclude = ["slow-suite", " ", "slow-suite"]
extern = { helper = "target/debug/libhelper.so" }
env = { RUST_BACKTRACE = "1" }
"#,
  )?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;
  let plan = build_plan(&ctx)?;
  let staged = WorkspaceStager::new(&plan, &ctx.config.publish)
    .with_build_dir(Some(ws.scratch().join("build")))
    .stage()?;

  let preflight =
    PreflightRunner::new(&runner, &ctx.config, &ws.path, &staged).inherited_rustflags(Some("-D warnings".to_string()));
  let test = preflight.test_invocation();

  let target_dir = staged.target_dir().to_string_lossy().into_owned();
  assert_eq!(
    test.command,
    vec![
      "cargo",
      "test",
      "--workspace",
      "--lib",
      "--bins",
      "--target-dir",
      target_dir.as_str(),
      "--exclude",
      "slow-suite",
    ]
  );
  assert_eq!(test.cwd, staged.root());
  assert_eq!(test.env.get("RUST_BACKTRACE").map(String::as_str), Some("1"));
  let expected_flags = format!(
    "-D warnings --extern helper={}",
    staged.root().join("target/debug/libhelper.so").display()
  );
  assert_eq!(test.env.get("RUSTFLAGS"), Some(&expected_flags));

  // Check does not carry test-only settings
  let check = preflight.check_invocation();
  assert!(check.env.is_empty());
  assert!(!check.command.contains(&"--exclude".to_string()));
  Ok(())
}

#[test]
fn test_preflight_env_applies_to_test_step_only() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write("shipyard.toml", "[preflight]\nenv = { SHIPYARD_FIXTURE = \"on\" }\n")?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;

  publish_workspace(&ctx, &runner, &args(&ws))?;

  let calls = runner.calls();
  let check = calls.iter().find(|c| c.command.get(1).map(String::as_str) == Some("check"));
  let test = calls.iter().find(|c| c.command.get(1).map(String::as_str) == Some("test"));
  assert!(check.is_some_and(|c| c.env.is_empty()));
  assert_eq!(
    test.and_then(|c| c.env.get("SHIPYARD_FIXTURE")).map(String::as_str),
    Some("on")
  );
  Ok(())
}

#[test]
fn test_configured_rustflags_replace_inherited_ones() -> Result<()> {
  let ws = three_crate_workspace()?;
  ws.write(
    "shipyard.toml",
    "[preflight]\nextern = { helper = \"/opt/libhelper.so\" }\nenv = { RUSTFLAGS = \"--cfg ci\" }\n",
  )?;
  let runner = ws.runner();
  let ctx = ws.context(&runner)?;
  let plan = build_plan(&ctx)?;
  let staged = WorkspaceStager::new(&plan, &ctx.config.publish)
    .with_build_dir(Some(ws.scratch().join("build")))
    .stage()?;

  let test = PreflightRunner::new(&runner, &ctx.config, &ws.path, &staged)
    .inherited_rustflags(Some("-D warnings".to_string()))
    .test_invocation();

  assert_eq!(
    test.env.get("RUSTFLAGS").map(String::as_str),
    Some("--cfg ci --extern helper=/opt/libhelper.so")
  );
  Ok(())
}
