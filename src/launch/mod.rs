//! The end-to-end launch sequence.
//!
//! ```text
//! Init ─► ContextReady ─► ConfigReady ─► DefinitionReady ─► [Clean]
//!      ─► WorkdirReady ─► SystemArtifactFetched ─► PlatformArtifactsFetched
//!      ─► UserArtifactsFetched ─► PackagesComputed ─► Prepared ─► Launched
//! ```
//!
//! Artifacts are fetched one after the other: the system artifact without
//! manifest attribute checks, then platform bundles, then user bundles.
//! A clean start empties the working directory only once the bundle cache
//! lock is held.

pub mod command;
pub mod executor;

use crate::artifact_cache::{ArtifactCache, ArtifactReference, CachedArtifact, Console, Transport};
use crate::config::Configuration;
use crate::error::{mandatory_str, Error, Result};
use crate::packages::{ExecutionEnvironments, PackageListAggregator};
use crate::platform::{LaunchContext, PlatformBuilder, PlatformDefinition};
use crate::preflight;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub use command::{framework_options, LaunchCommand, FRAMEWORK_OPTS_VAR};
pub use executor::{
    DryRunExecutor, JavaRunner, LaunchExecutor, LaunchOutcome, ProcessExecutor, RunnerExecutor,
};

/// Steps of a launch, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LaunchState {
    Init,
    ContextReady,
    ConfigReady,
    DefinitionReady,
    Clean,
    WorkdirReady,
    SystemArtifactFetched,
    PlatformArtifactsFetched,
    UserArtifactsFetched,
    PackagesComputed,
    Prepared,
    Launched,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A fully provisioned platform, ready to hand to an executor.
///
/// Keeps the bundle cache locked until dropped.
pub struct PreparedLaunch {
    pub context: LaunchContext,
    pub command: LaunchCommand,
    cache: ArtifactCache,
}

impl PreparedLaunch {
    pub fn bundles_dir(&self) -> &Path {
        self.cache.bundles_dir()
    }
}

/// Drives a [`PlatformBuilder`] through provisioning and launch.
pub struct LaunchOrchestrator<B> {
    builder: B,
    transport: Arc<dyn Transport>,
    environments: ExecutionEnvironments,
    console: Console,
}

impl<B: PlatformBuilder> LaunchOrchestrator<B> {
    pub fn new(builder: B, transport: Arc<dyn Transport>) -> Self {
        Self {
            builder,
            transport,
            environments: ExecutionEnvironments::bundled(),
            console: Console::default(),
        }
    }

    pub fn with_environments(mut self, environments: ExecutionEnvironments) -> Self {
        self.environments = environments;
        self
    }

    /// Where status lines and download progress go.
    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    /// Provision everything and hand the command to `executor`.
    pub fn launch<E: LaunchExecutor>(
        &self,
        configuration: Configuration,
        bundles: &[ArtifactReference],
        mut executor: E,
    ) -> Result<LaunchOutcome> {
        let prepared = self.prepare(configuration, bundles)?;
        let outcome = executor.execute(&prepared.command)?;
        debug!("launch state {} -> {}", LaunchState::Prepared, LaunchState::Launched);
        Ok(outcome)
    }

    /// Run every step up to [`LaunchState::Prepared`].
    pub fn prepare(
        &self,
        configuration: Configuration,
        bundles: &[ArtifactReference],
    ) -> Result<PreparedLaunch> {
        let mut state = Transitions::default();
        info!("preparing platform");

        let main_class = mandatory_str("main class of the platform", self.builder.main_class_name())?
            .to_string();

        let working_directory = configuration.working_directory.clone();
        let mut context = LaunchContext::new(configuration, working_directory);
        state.advance(LaunchState::ContextReady);
        let config = context.configuration().clone();
        state.advance(LaunchState::ConfigReady);

        let definition = self.load_definition(&config)?;
        debug!(
            "using platform definition with system artifact [{}]",
            definition.system().url
        );
        state.advance(LaunchState::DefinitionReady);

        let work_dir = create_working_dir(&config.working_directory)?;
        // The cache lock must be held before anything is cleaned.
        let cache = ArtifactCache::open(&work_dir, Arc::clone(&self.transport))?
            .with_progress(config.download_feedback)
            .with_console(self.console);
        if config.clean_start {
            clean(&work_dir, &cache)?;
            state.advance(LaunchState::Clean);
        }
        debug!("using working directory {}", work_dir.display());
        context.set_working_directory(work_dir.clone());
        state.advance(LaunchState::WorkdirReady);

        self.console.say("Downloading bundles...");

        let system = cache.fetch_reference(definition.system(), config.overwrite_system(), false)?;
        context.set_system_artifact(system.path.clone());
        state.advance(LaunchState::SystemArtifactFetched);

        let mut profiles = config.profiles.clone();
        if let Some(required) = self
            .builder
            .required_profile(&context)
            .filter(|p| !p.trim().is_empty())
        {
            profiles.push(required);
        }
        let platform = fetch_all(
            &cache,
            &definition.platform_bundles(&profiles),
            config.overwrite_system(),
        )?;
        context.add_bundles(platform);
        state.advance(LaunchState::PlatformArtifactsFetched);

        let user = fetch_all(&cache, bundles, config.overwrite_user())?;
        context.add_bundles(user);
        state.advance(LaunchState::UserArtifactsFetched);

        let aggregator = PackageListAggregator::new(
            self.environments.clone(),
            Arc::clone(&self.transport),
        );
        let packages = aggregator.build_package_list(
            &config.execution_environment,
            config.system_packages.as_deref(),
            definition.packages(),
        )?;
        context.set_system_packages(packages);
        state.advance(LaunchState::PackagesComputed);

        self.builder.prepare(&context)?;
        state.advance(LaunchState::Prepared);

        let command = self.command(&context, &system, main_class)?;
        Ok(PreparedLaunch {
            context,
            command,
            cache,
        })
    }

    fn load_definition(&self, config: &Configuration) -> Result<PlatformDefinition> {
        match config.definition.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(location) => PlatformDefinition::load(
                location,
                self.transport.as_ref(),
                config.profile_start_level,
            ),
            None => PlatformDefinition::parse(
                &self.builder.default_definition()?,
                config.profile_start_level,
            ),
        }
    }

    fn command(
        &self,
        context: &LaunchContext,
        system: &CachedArtifact,
        main_class: String,
    ) -> Result<LaunchCommand> {
        let config = context.configuration();
        let java = config.java_home().map(|home| preflight::java_path(&home));
        if java.is_none() {
            debug!("no Java home found; only delegated launches can run");
        }

        let mut vm_options = config.vm_options.clone();
        vm_options.extend(self.builder.vm_options(context));

        let mut arguments = self.builder.arguments(context);
        arguments.extend(framework_options());

        Ok(LaunchCommand {
            java,
            vm_options,
            classpath: format!("{}{}", system.path.display(), config.classpath),
            main_class,
            arguments,
            working_directory: context.working_directory().to_path_buf(),
        })
    }
}

#[derive(Default)]
struct Transitions {
    current: Option<LaunchState>,
}

impl Transitions {
    fn advance(&mut self, next: LaunchState) {
        let from = self.current.unwrap_or(LaunchState::Init);
        debug!("launch state {from} -> {next}");
        self.current = Some(next);
    }
}

fn fetch_all(
    cache: &ArtifactCache,
    references: &[ArtifactReference],
    overwrite: bool,
) -> Result<Vec<CachedArtifact>> {
    references
        .iter()
        .map(|reference| cache.fetch_reference(reference, overwrite, true))
        .collect()
}

/// Empty the working directory, keeping only the held cache lock.
fn clean(working_directory: &Path, cache: &ArtifactCache) -> Result<()> {
    info!("cleaning working directory {}", working_directory.display());
    let failed = |path: &Path, e| Error::io(format!("removing '{}'", path.display()), e);

    let entries = fs::read_dir(working_directory).map_err(|e| failed(working_directory, e))?;
    for entry in entries {
        let path = entry.map_err(|e| failed(working_directory, e))?.path();
        if path == cache.bundles_dir() {
            continue;
        }
        remove_path(&path).map_err(|e| failed(&path, e))?;
    }
    cache.clear()
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() && !path.is_symlink() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn create_working_dir(working_directory: &Path) -> Result<PathBuf> {
    fs::create_dir_all(working_directory)
        .and_then(|()| working_directory.canonicalize())
        .map_err(|e| {
            Error::io(
                format!("creating working directory '{}'", working_directory.display()),
                e,
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact_cache::manifest::testing::write_jar;
    use crate::artifact_cache::transport::open_file;
    use crate::artifact_cache::{hash_stem, Download};
    use reqwest::Url;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingTransport {
        opened: AtomicUsize,
    }

    impl Transport for CountingTransport {
        fn open(&self, url: &Url) -> anyhow::Result<Download> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            open_file(url)
        }
    }

    struct TestBuilder {
        main_class: String,
        definition: String,
        prepared: RefCell<Option<LaunchContext>>,
    }

    impl TestBuilder {
        fn new(definition: String) -> Self {
            Self {
                main_class: "org.example.Main".to_string(),
                definition,
                prepared: RefCell::new(None),
            }
        }
    }

    impl PlatformBuilder for TestBuilder {
        fn main_class_name(&self) -> &str {
            &self.main_class
        }

        fn default_definition(&self) -> Result<String> {
            Ok(self.definition.clone())
        }

        fn required_profile(&self, _context: &LaunchContext) -> Option<String> {
            Some("required".to_string())
        }

        fn vm_options(&self, _context: &LaunchContext) -> Vec<String> {
            vec!["-Dbuilder=1".to_string()]
        }

        fn arguments(&self, _context: &LaunchContext) -> Vec<String> {
            vec!["-console".to_string()]
        }

        fn prepare(&self, context: &LaunchContext) -> Result<()> {
            *self.prepared.borrow_mut() = Some(context.clone());
            Ok(())
        }
    }

    struct Fixture {
        tmp: TempDir,
        transport: Arc<CountingTransport>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
                transport: Arc::new(CountingTransport::default()),
            }
        }

        fn jar(&self, file: &str, headers: &[(&str, &str)]) -> Url {
            let path = self.tmp.path().join("repo").join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            write_jar(&path, Some(headers));
            Url::from_file_path(&path).unwrap()
        }

        fn config(&self) -> Configuration {
            Configuration {
                working_directory: self.tmp.path().join("work"),
                execution_environment: "NONE".to_string(),
                system_packages: Some("org.example.api".to_string()),
                vm_options: vec!["-Xmx64m".to_string()],
                java_home: Some(PathBuf::from("/opt/jdk")),
                profile_start_level: Some(4),
                download_feedback: crate::artifact_cache::ProgressMode::Silent,
                ..Configuration::default()
            }
        }

        fn orchestrator(&self, builder: TestBuilder) -> LaunchOrchestrator<TestBuilder> {
            LaunchOrchestrator::new(builder, self.transport.clone())
        }

        fn definition(&self) -> String {
            let system = self.jar(
                "framework.jar",
                &[
                    ("Bundle-SymbolicName", "org.example.framework"),
                    ("Bundle-Version", "1.0"),
                ],
            );
            let core = self.jar("core.jar", &[("Bundle-SymbolicName", "org.example.core")]);
            let extra = self.jar("extra.jar", &[("Bundle-SymbolicName", "org.example.extra")]);
            let optional =
                self.jar("optional.jar", &[("Bundle-SymbolicName", "org.example.optional")]);
            format!(
                "packages = \"org.osgi.framework\"\n\
                 [system]\nurl = \"{system}\"\n\
                 [[bundle]]\nurl = \"{core}\"\n\
                 [[bundle]]\nurl = \"{extra}\"\nprofile = \"required\"\n\
                 [[bundle]]\nurl = \"{optional}\"\nprofile = \"optional\"\n"
            )
        }
    }

    #[test]
    fn blank_main_class_fails_before_io() {
        let fixture = Fixture::new();
        let mut builder = TestBuilder::new(String::new());
        builder.main_class = "  ".to_string();

        let err = fixture
            .orchestrator(builder)
            .prepare(fixture.config(), &[])
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(!fixture.tmp.path().join("work").exists());
        assert_eq!(fixture.transport.opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn prepares_full_command() {
        let fixture = Fixture::new();
        let definition = fixture.definition();
        let user = fixture.jar("user.jar", &[("Bundle-Name", "User Bundle")]);
        let orchestrator = fixture.orchestrator(TestBuilder::new(definition));

        let prepared = orchestrator
            .prepare(fixture.config(), &[ArtifactReference::new(user.clone())])
            .unwrap();

        let work = fixture.tmp.path().join("work").canonicalize().unwrap();
        let system_jar = work.join("bundles").join("org.example.framework_1.0.jar");
        assert!(system_jar.is_file());

        let command = &prepared.command;
        assert_eq!(command.java, Some(PathBuf::from("/opt/jdk/bin/java")));
        assert_eq!(command.vm_options, ["-Xmx64m", "-Dbuilder=1"]);
        assert_eq!(command.classpath, system_jar.display().to_string());
        assert_eq!(command.main_class, "org.example.Main");
        assert_eq!(command.arguments[0], "-console");
        assert_eq!(command.working_directory, work);

        let context = orchestrator.builder().prepared.borrow().clone().unwrap();
        assert_eq!(context.system_artifact(), Some(system_jar.as_path()));
        assert_eq!(context.system_packages(), "org.example.api, org.osgi.framework");
        let names: Vec<String> = context
            .bundles()
            .iter()
            .map(|b| b.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        // Without a symbolic name the file keeps the URL hash.
        let user_name = format!("{}_0.0.0.jar", hash_stem(user.as_str()));
        assert_eq!(
            names,
            [
                "org.example.core_0.0.0.jar",
                "org.example.extra_0.0.0.jar",
                user_name.as_str()
            ]
        );
        assert_eq!(context.bundles()[1].reference.start_level, Some(4));
    }

    #[test]
    fn second_launch_reuses_cache() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(TestBuilder::new(fixture.definition()));

        drop(orchestrator.prepare(fixture.config(), &[]).unwrap());
        let first = fixture.transport.opened.load(Ordering::SeqCst);
        assert_eq!(first, 3);

        drop(orchestrator.prepare(fixture.config(), &[]).unwrap());
        assert_eq!(fixture.transport.opened.load(Ordering::SeqCst), first);
    }

    #[test]
    fn clean_start_removes_working_directory() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(TestBuilder::new(fixture.definition()));
        let stale = fixture.tmp.path().join("work").join("stale.txt");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        let config = Configuration {
            clean_start: true,
            ..fixture.config()
        };
        drop(orchestrator.prepare(config, &[]).unwrap());
        assert!(!stale.exists());
        assert_eq!(fixture.transport.opened.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn clean_start_empties_bundle_cache() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(TestBuilder::new(fixture.definition()));
        drop(orchestrator.prepare(fixture.config(), &[]).unwrap());

        let config = Configuration {
            clean_start: true,
            ..fixture.config()
        };
        drop(orchestrator.prepare(config, &[]).unwrap());
        assert_eq!(fixture.transport.opened.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn clean_start_leaves_locked_directory_alone() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(TestBuilder::new(fixture.definition()));
        let running = orchestrator.prepare(fixture.config(), &[]).unwrap();
        let system_jar = running.context.system_artifact().unwrap().to_path_buf();

        let config = Configuration {
            clean_start: true,
            ..fixture.config()
        };
        let err = orchestrator.prepare(config, &[]).map(|_| ()).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(system_jar.is_file());
        assert!(running.bundles_dir().join("downloaded_bundles.properties").is_file());
    }

    #[test]
    fn launch_hands_command_to_executor() {
        let fixture = Fixture::new();
        let orchestrator = fixture.orchestrator(TestBuilder::new(fixture.definition()));
        let mut out = Vec::new();

        let outcome = orchestrator
            .launch(fixture.config(), &[], DryRunExecutor::new(&mut out))
            .unwrap();
        assert_eq!(outcome, LaunchOutcome::Delegated);

        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["main_class"], "org.example.Main");
    }
}
