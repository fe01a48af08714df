use std::fs;
use std::path::{Path, PathBuf};

use riglauncher_core::{ConfigRecord, DecisionSink, RepositorySlug, KEY_INSTALL_PATH, KEY_TAG};
use riglauncher_deploy::DEFAULT_RETRY_CEILING;

use crate::orchestrator::{build_launch_args, LauncherContext, Phase, UpdateOrchestrator};

fn test_dir(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("riglauncher-cli-test-{label}-{nanos}"));
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

fn context_for(dir: &Path) -> LauncherContext {
    LauncherContext {
        project_name: "Solar Ride".to_string(),
        repository: RepositorySlug::parse("studio/solarride-tools").expect("valid slug"),
        install_path: None,
        requested_tag: None,
        manifest_name: None,
        companion_app: None,
        config_path: Some(dir.join("launcher.cfg")),
        script_path: None,
        include_prereleases: false,
        dev: false,
        requirements_path: None,
        retry_ceiling: DEFAULT_RETRY_CEILING,
    }
}

struct ScriptedDecisions {
    confirm_answers: Vec<bool>,
    path_answer: Option<PathBuf>,
    confirms_asked: usize,
}

impl ScriptedDecisions {
    fn new(confirm_answers: Vec<bool>, path_answer: Option<PathBuf>) -> Self {
        Self {
            confirm_answers,
            path_answer,
            confirms_asked: 0,
        }
    }
}

impl DecisionSink for ScriptedDecisions {
    fn confirm(&mut self, _prompt: &str) -> bool {
        self.confirms_asked += 1;
        if self.confirm_answers.is_empty() {
            true
        } else {
            self.confirm_answers.remove(0)
        }
    }

    fn choose_install_path(&mut self, _prompt: &str) -> Option<PathBuf> {
        self.path_answer.clone()
    }
}

#[test]
fn phases_advance_in_one_fixed_order() {
    let mut sequence = vec![Phase::Init];
    while let Some(next) = sequence.last().expect("non-empty").next() {
        sequence.push(next);
    }
    assert_eq!(
        sequence,
        vec![
            Phase::Init,
            Phase::CheckPrerequisites,
            Phase::SelectInstallPath,
            Phase::ResolveVersion,
            Phase::EnsureEnvironment,
            Phase::Deploy,
            Phase::SupervisedHandoff,
            Phase::Ready,
        ]
    );
}

#[test]
fn launch_args_contract() {
    let paths = vec![
        PathBuf::from("/opt/tools"),
        PathBuf::from("/opt/tools/solarride/Lib/site-packages"),
    ];
    let args = build_launch_args(
        "solarride",
        Path::new("/opt/tools"),
        &paths,
        "3.2.0",
        Some(Path::new("/home/artist/.config/solarride/launcher.cfg")),
        true,
    );
    assert_eq!(
        args,
        vec![
            "--project-name",
            "solarride",
            "--install-path",
            "/opt/tools",
            "--paths-to-register",
            "/opt/tools /opt/tools/solarride/Lib/site-packages",
            "--tag",
            "3.2.0",
            "--config-path",
            "/home/artist/.config/solarride/launcher.cfg",
            "--dev",
        ]
    );
}

#[test]
fn launch_args_skip_absent_options() {
    let paths = vec![PathBuf::from("/opt/tools")];
    let args = build_launch_args("solarride", Path::new("/opt/tools"), &paths, "3.2.0", None, false);
    assert_eq!(args.len(), 8);
    assert!(!args.contains(&"--dev".to_string()));
    assert!(!args.contains(&"--config-path".to_string()));
}

#[test]
fn vanished_stored_install_path_is_cleared_and_reprompted() {
    let dir = test_dir("stale-install-path");
    let config_path = dir.join("launcher.cfg");
    let mut seed = ConfigRecord::load(&config_path).expect("must load");
    seed.set(KEY_INSTALL_PATH, &dir.join("gone").display().to_string())
        .expect("must seed");

    let replacement = dir.join("chosen");
    let mut orchestrator =
        UpdateOrchestrator::new(context_for(&dir)).expect("must construct");
    let mut decisions = ScriptedDecisions::new(vec![], Some(replacement.clone()));

    let selected = orchestrator
        .select_install_path(&mut decisions)
        .expect("must select");
    assert_eq!(selected, replacement);
    assert!(replacement.is_dir());

    let reloaded = ConfigRecord::load(&config_path).expect("must reload");
    assert_eq!(
        reloaded.get(KEY_INSTALL_PATH),
        Some(replacement.display().to_string().as_str())
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn cancelling_the_install_path_prompt_aborts() {
    let dir = test_dir("cancelled-install-path");
    let mut orchestrator =
        UpdateOrchestrator::new(context_for(&dir)).expect("must construct");
    let mut decisions = ScriptedDecisions::new(vec![], None);

    let err = orchestrator
        .select_install_path(&mut decisions)
        .expect_err("must abort");
    assert!(err.to_string().contains("cancelled"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn dev_mode_resolves_the_dev_sentinel() {
    let dir = test_dir("dev-tag");
    let mut context = context_for(&dir);
    context.dev = true;
    let mut orchestrator = UpdateOrchestrator::new(context).expect("must construct");
    let mut decisions = ScriptedDecisions::new(vec![], None);

    let tag = orchestrator
        .resolve_version(&mut decisions)
        .expect("must resolve");
    assert!(tag.is_dev());
    assert_eq!(decisions.confirms_asked, 0);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn declined_tag_switch_keeps_the_stored_version() {
    let dir = test_dir("tag-switch");
    let config_path = dir.join("launcher.cfg");
    let mut seed = ConfigRecord::load(&config_path).expect("must load");
    seed.set(KEY_TAG, "3.1.0").expect("must seed");

    let mut context = context_for(&dir);
    context.requested_tag = Some("v3.2.0".to_string());

    let mut orchestrator =
        UpdateOrchestrator::new(context.clone()).expect("must construct");
    let mut declining = ScriptedDecisions::new(vec![false], None);
    let kept = orchestrator
        .resolve_version(&mut declining)
        .expect("must resolve");
    assert_eq!(kept.label(), "3.1.0");
    assert_eq!(declining.confirms_asked, 1);

    let mut orchestrator = UpdateOrchestrator::new(context).expect("must construct");
    let mut accepting = ScriptedDecisions::new(vec![true], None);
    let switched = orchestrator
        .resolve_version(&mut accepting)
        .expect("must resolve");
    assert_eq!(switched.label(), "3.2.0");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn accepted_tag_switch_persists_and_forces_a_clean_deploy() {
    let dir = test_dir("tag-switch-clean");
    let config_path = dir.join("launcher.cfg");
    let mut seed = ConfigRecord::load(&config_path).expect("must load");
    seed.set(KEY_TAG, "3.1.0").expect("must seed");

    let mut context = context_for(&dir);
    context.requested_tag = Some("v3.2.0".to_string());
    let mut orchestrator = UpdateOrchestrator::new(context).expect("must construct");
    let mut accepting = ScriptedDecisions::new(vec![true], None);

    let (tag, clean) = orchestrator
        .resolve_deploy_target(&mut accepting)
        .expect("must resolve");
    assert_eq!(tag.label(), "3.2.0");
    assert!(clean, "a confirmed switch must recreate the environment");

    // The switch is recorded at the decision point, not after deploy.
    let reloaded = ConfigRecord::load(&config_path).expect("must reload");
    assert_eq!(reloaded.get(KEY_TAG), Some("3.2.0"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn declined_tag_switch_does_not_force_a_clean_deploy() {
    let dir = test_dir("tag-switch-declined");
    let config_path = dir.join("launcher.cfg");
    let mut seed = ConfigRecord::load(&config_path).expect("must load");
    seed.set(KEY_TAG, "3.1.0").expect("must seed");

    let mut context = context_for(&dir);
    context.requested_tag = Some("v3.2.0".to_string());
    let mut orchestrator = UpdateOrchestrator::new(context).expect("must construct");
    let mut declining = ScriptedDecisions::new(vec![false], None);

    let (tag, clean) = orchestrator
        .resolve_deploy_target(&mut declining)
        .expect("must resolve");
    assert_eq!(tag.label(), "3.1.0");
    assert!(!clean);

    let reloaded = ConfigRecord::load(&config_path).expect("must reload");
    assert_eq!(reloaded.get(KEY_TAG), Some("3.1.0"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn matching_requested_tag_keeps_the_existing_environment() {
    let dir = test_dir("tag-switch-same");
    let config_path = dir.join("launcher.cfg");
    let mut seed = ConfigRecord::load(&config_path).expect("must load");
    seed.set(KEY_TAG, "3.1.0").expect("must seed");

    let mut context = context_for(&dir);
    context.requested_tag = Some("v3.1.0".to_string());
    let mut orchestrator = UpdateOrchestrator::new(context).expect("must construct");
    let mut decisions = ScriptedDecisions::new(vec![], None);

    let (tag, clean) = orchestrator
        .resolve_deploy_target(&mut decisions)
        .expect("must resolve");
    assert_eq!(tag.label(), "3.1.0");
    assert!(!clean);
    assert_eq!(decisions.confirms_asked, 0);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn uninstall_removes_only_the_managed_subdirectory() {
    let dir = test_dir("uninstall-partial");
    let install_root = dir.join("tools");
    fs::create_dir_all(install_root.join("solarride/bin")).expect("must create");
    fs::write(install_root.join("keep.txt"), "unrelated").expect("must write");

    let config_path = dir.join("launcher.cfg");
    let mut seed = ConfigRecord::load(&config_path).expect("must load");
    seed.set(KEY_INSTALL_PATH, &install_root.display().to_string())
        .expect("must seed");

    let mut orchestrator =
        UpdateOrchestrator::new(context_for(&dir)).expect("must construct");
    orchestrator
        .remove_installation(&install_root)
        .expect("must uninstall");

    assert!(!install_root.join("solarride").exists());
    assert!(install_root.join("keep.txt").is_file());
    assert!(install_root.is_dir());

    let reloaded = ConfigRecord::load(&config_path).expect("must reload");
    assert_eq!(reloaded.get(KEY_INSTALL_PATH), None);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn uninstall_removes_the_root_when_it_ends_up_empty() {
    let dir = test_dir("uninstall-empty-root");
    let install_root = dir.join("tools");
    fs::create_dir_all(install_root.join("solarride")).expect("must create");

    let mut orchestrator =
        UpdateOrchestrator::new(context_for(&dir)).expect("must construct");
    orchestrator
        .remove_installation(&install_root)
        .expect("must uninstall");
    assert!(!install_root.exists());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn uninstall_without_a_recorded_path_is_a_noop() {
    let dir = test_dir("uninstall-noop");
    let mut orchestrator =
        UpdateOrchestrator::new(context_for(&dir)).expect("must construct");
    let mut decisions = ScriptedDecisions::new(vec![], None);

    orchestrator
        .uninstall(&mut decisions, false)
        .expect("must be a no-op");
    assert_eq!(decisions.confirms_asked, 0);

    let _ = fs::remove_dir_all(dir);
}
