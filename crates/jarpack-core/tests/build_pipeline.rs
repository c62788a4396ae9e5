use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jarpack_core::{
    Archive, BuildError, BuildTool, CatalogEntry, DeclaredProject, DefaultArtifactResolver,
    FractionCatalog, FractionDetectionMode, LocalRepository, PlatformCoordinates, ProjectAsset,
};
use jarpack_schema::{ArtifactSpec, BundleManifest, Scope};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const EXTRA_MODULE: &str = r#"<module xmlns="urn:jboss:module:1.3" name="org.platform.extra">
  <resources>
    <artifact name="${org.platform:extra:9.0}"/>
  </resources>
</module>
"#;

/// A scratch local repository plus a project directory.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        };
        fixture.publish(
            &ArtifactSpec::new("com.acme", "widgets", "1.2"),
            &[("com/acme/widgets/Widget.class", b"widget")],
            &[],
        );
        fixture.publish(
            &ArtifactSpec::new("org.platform", "core", "9.0"),
            &[
                ("org/platform/core/Core.class", b"core"),
                (
                    "META-INF/fraction-manifest.toml",
                    b"module = \"org.platform.core\"\n",
                ),
            ],
            &[],
        );
        fixture.publish(
            &ArtifactSpec::new("org.platform", "bootstrap", "9.0"),
            &[
                ("org/platform/bootstrap/Main.class", b"main"),
                ("org/jboss/modules/ModuleLoader.class", b"loader"),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n"),
            ],
            &[],
        );
        fixture.publish(
            &ArtifactSpec::new("org.platform", "extra", "9.0"),
            &[("org/platform/extra/Extra.class", b"extra")],
            &[],
        );
        fixture
    }

    fn repo(&self) -> PathBuf {
        self.dir.path().join("repository")
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn publish(&self, spec: &ArtifactSpec, entries: &[(&str, &[u8])], deps: &[&ArtifactSpec]) {
        write_jar(&self.repo().join(spec.repo_path(true)), entries);

        let mut pom = String::from("<project><dependencies>");
        for dep in deps {
            pom.push_str(&format!(
                "<dependency><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version></dependency>",
                dep.group_id(),
                dep.artifact_id(),
                dep.version()
            ));
        }
        pom.push_str("</dependencies></project>");
        let pom_spec = ArtifactSpec::new(spec.group_id(), spec.artifact_id(), spec.version())
            .with_type("pom");
        std::fs::write(self.repo().join(pom_spec.repo_path(true)), pom).unwrap();
    }

    fn app_jar(&self) -> PathBuf {
        let path = self.path("target/shop-1.0.jar");
        write_jar(&path, &[("com/acme/shop/Shop.class", b"shop")]);
        path
    }

    fn module_dir(&self) -> PathBuf {
        let dir = self.path("src/main/modules");
        let module = dir.join("org/platform/extra/main/module.xml");
        std::fs::create_dir_all(module.parent().unwrap()).unwrap();
        std::fs::write(module, EXTRA_MODULE).unwrap();
        dir
    }

    fn tool(&self, directs: Vec<ArtifactSpec>) -> BuildTool {
        let repo = Arc::new(LocalRepository::new([self.repo()]));
        let resolver = DefaultArtifactResolver::new(repo.clone(), Arc::default());
        let project = DeclaredProject::new(repo, "org.platform", directs);
        BuildTool::new(resolver, Box::new(project), platform())
    }

    fn standard_tool(&self) -> BuildTool {
        let app = ArtifactSpec::new("com.acme", "shop", "1.0");
        self.tool(vec![
            ArtifactSpec::new("com.acme", "widgets", "1.2"),
            ArtifactSpec::new("org.platform", "core", "9.0"),
            ArtifactSpec::new("org.platform", "bootstrap", "9.0"),
            ArtifactSpec::new("junit", "junit", "4.13").with_scope(Scope::Test),
        ])
        .project_asset(ProjectAsset::artifact(app, self.app_jar(), None))
        .additional_module(self.module_dir())
    }
}

/// Catalog where using `org.platform.web` implies the `web` fraction, which
/// in turn needs the bootstrap.
fn web_catalog() -> FractionCatalog {
    FractionCatalog::new("org.platform", [
        CatalogEntry {
            group_id: "org.platform".into(),
            artifact_id: "web".into(),
            version: "9.0".into(),
            packages: vec!["org.platform.web".into()],
            dependencies: vec!["bootstrap".into()],
        },
        CatalogEntry {
            group_id: "org.platform".into(),
            artifact_id: "bootstrap".into(),
            version: "9.0".into(),
            packages: vec![],
            dependencies: vec![],
        },
    ])
}

fn platform() -> PlatformCoordinates {
    PlatformCoordinates {
        group_id: "org.platform".into(),
        bootstrap_artifact_id: "bootstrap".into(),
        ..PlatformCoordinates::default()
    }
}

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

fn manifest(archive: &Archive) -> BundleManifest {
    let bytes = archive
        .read(BundleManifest::CLASSPATH_LOCATION)
        .unwrap()
        .expect("bundle manifest missing");
    BundleManifest::from_toml(&String::from_utf8(bytes).unwrap()).unwrap()
}

#[tokio::test]
async fn test_bundle_layout() {
    let fixture = Fixture::new();

    let archive = fixture
        .standard_tool()
        .embed_application_dependencies(true)
        .build()
        .await
        .unwrap();

    assert_eq!(archive.paths_under("m2repo/"), vec![
        "m2repo/com/acme/widgets/1.2/widgets-1.2.jar",
        "m2repo/org/platform/core/9.0/core-9.0.jar",
        "m2repo/org/platform/extra/9.0/extra-9.0.jar",
    ]);
    assert!(archive.contains("org/platform/bootstrap/Main.class"));
    assert!(archive.contains("modules/org/platform/extra/main/module.xml"));
    assert!(archive.contains("_bootstrap/shop.jar"));

    let launch = String::from_utf8(archive.read("META-INF/MANIFEST.MF").unwrap().unwrap()).unwrap();
    assert!(launch.contains("Main-Class: org.wildfly.swarm.bootstrap.Main"));

    let manifest = manifest(&archive);
    assert_eq!(
        manifest.bootstrap_artifacts.iter().collect::<Vec<_>>(),
        vec!["org.platform:core:9.0"]
    );
    assert!(manifest.bootstrap_modules.contains("org.platform.core"));
    assert_eq!(
        manifest.dependencies.iter().collect::<Vec<_>>(),
        vec!["com.acme:widgets:1.2"]
    );
    assert_eq!(manifest.asset.as_deref(), Some("shop.jar"));
    assert!(manifest.properties.contains_key("jarpack.bundle.build.timestamp"));
}

#[tokio::test]
async fn test_hollow_bundle_has_no_application_content() {
    let fixture = Fixture::new();

    let archive = fixture
        .tool(vec![
            ArtifactSpec::new("com.acme", "widgets", "1.2"),
            ArtifactSpec::new("org.platform", "core", "9.0"),
            ArtifactSpec::new("org.platform", "bootstrap", "9.0"),
        ])
        .hollow(true)
        .build()
        .await
        .unwrap();

    assert!(archive.paths_under("_bootstrap/").is_empty());
    assert_eq!(archive.paths_under("m2repo/"), vec![
        "m2repo/org/platform/core/9.0/core-9.0.jar"
    ]);
    let manifest = manifest(&archive);
    assert!(manifest.hollow);
    assert_eq!(manifest.asset, None);
}

#[tokio::test]
async fn test_missing_bootstrap_writes_nothing() {
    let fixture = Fixture::new();
    let out = fixture.path("out");

    let err = fixture
        .tool(vec![ArtifactSpec::new("com.acme", "widgets", "1.2")])
        .project_asset(ProjectAsset::artifact(
            ArtifactSpec::new("com.acme", "shop", "1.0"),
            fixture.app_jar(),
            None,
        ))
        .fraction_detection_mode(FractionDetectionMode::Never)
        .build_to("shop", &out)
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::MissingBootstrap { ref artifact_id, .. } if artifact_id == "bootstrap"));
    assert!(!BuildTool::output_file("shop", &out).exists());
}

#[tokio::test]
async fn test_unresolvable_module_dependency_fails() {
    let fixture = Fixture::new();
    let dir = fixture.path("more-modules");
    let module = dir.join("org/missing/main/module.xml");
    std::fs::create_dir_all(module.parent().unwrap()).unwrap();
    std::fs::write(
        module,
        r#"<module name="org.missing"><resources><artifact name="${org.nowhere:gone:1.0}"/></resources></module>"#,
    )
    .unwrap();

    let err = fixture
        .standard_tool()
        .additional_module(dir)
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::Resolution { ref coordinate } if coordinate.contains("org.nowhere:gone")));
}

#[tokio::test]
async fn test_thin_bundle_embeds_no_repository() {
    let fixture = Fixture::new();

    let archive = fixture
        .standard_tool()
        .bundle_dependencies(false)
        .build()
        .await
        .unwrap();

    assert!(archive.paths_under("m2repo/").is_empty());
    assert!(archive.contains("_bootstrap/shop.jar"));
    assert!(!manifest(&archive).bundle_dependencies);
}

#[tokio::test]
async fn test_executable_bundle_starts_with_launch_script() {
    let fixture = Fixture::new();
    let out = fixture.path("out");

    let output = fixture
        .standard_tool()
        .executable(true)
        .build_to("shop", &out)
        .await
        .unwrap();

    assert_eq!(output.path, out.join("shop-bundle.jar"));
    assert_eq!(output.sha256.len(), 64);
    let bytes = std::fs::read(&output.path).unwrap();
    assert!(bytes.starts_with(b"#!/bin/sh"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&output.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}

#[tokio::test]
async fn test_repository_layout_is_stable() {
    let fixture = Fixture::new();

    let first = fixture.standard_tool().build().await.unwrap();
    let second = fixture.standard_tool().build().await.unwrap();

    assert_eq!(first.paths_under("m2repo/"), second.paths_under("m2repo/"));
    assert_eq!(
        first.paths().collect::<Vec<_>>(),
        second.paths().collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_transitive_dependencies_follow_poms() {
    let fixture = Fixture::new();
    let gears = ArtifactSpec::new("com.acme", "gears", "2.0");
    fixture.publish(&gears, &[("com/acme/gears/Gear.class", b"gear")], &[]);
    fixture.publish(
        &ArtifactSpec::new("com.acme", "widgets", "1.1"),
        &[("com/acme/widgets/Widget.class", b"widget")],
        &[&gears],
    );

    let archive = fixture
        .tool(vec![
            ArtifactSpec::new("com.acme", "widgets", "1.1"),
            ArtifactSpec::new("org.platform", "bootstrap", "9.0"),
        ])
        .project_asset(ProjectAsset::artifact(
            ArtifactSpec::new("com.acme", "shop", "1.0"),
            fixture.app_jar(),
            None,
        ))
        .embed_application_dependencies(true)
        .build()
        .await
        .unwrap();

    assert_eq!(
        manifest(&archive).dependencies.iter().collect::<Vec<_>>(),
        vec!["com.acme:gears:2.0", "com.acme:widgets:1.1"]
    );
    assert!(archive.contains("m2repo/com/acme/gears/2.0/gears-2.0.jar"));
}

#[tokio::test]
async fn test_war_repackage_keeps_only_application_jars() {
    let fixture = Fixture::new();
    let war = fixture.path("target/shop-1.0.war");
    write_jar(&war, &[
        ("WEB-INF/classes/com/acme/shop/Shop.class", b"shop"),
        ("WEB-INF/lib/widgets-1.2.jar", b"widget"),
        ("WEB-INF/lib/core-9.0.jar", b"core"),
    ]);

    let report = fixture
        .tool(vec![
            ArtifactSpec::new("com.acme", "widgets", "1.2"),
            ArtifactSpec::new("org.platform", "core", "9.0"),
        ])
        .repackage_war(&war)
        .await
        .unwrap();

    assert_eq!(report.kept, vec!["widgets-1.2.jar"]);
    assert_eq!(report.removed, vec!["core-9.0.jar"]);
    assert!(report.added.is_empty());

    let repackaged = Archive::import_zip(&war).unwrap();
    assert_eq!(repackaged.paths_under("WEB-INF/lib/"), vec!["WEB-INF/lib/widgets-1.2.jar"]);
    assert!(repackaged.contains("WEB-INF/classes/com/acme/shop/Shop.class"));
    assert!(fixture.path("target/shop-1.0.war.original").is_file());
}

#[tokio::test]
async fn test_repository_holds_only_platform_and_module_dependencies_by_default() {
    let fixture = Fixture::new();

    let archive = fixture.standard_tool().build().await.unwrap();

    assert_eq!(archive.paths_under("m2repo/"), vec![
        "m2repo/org/platform/core/9.0/core-9.0.jar",
        "m2repo/org/platform/extra/9.0/extra-9.0.jar",
    ]);
    assert_eq!(
        manifest(&archive).dependencies.iter().collect::<Vec<_>>(),
        vec!["com.acme:widgets:1.2"]
    );
}

#[tokio::test]
async fn test_detected_fraction_supplies_bootstrap() {
    let fixture = Fixture::new();
    fixture.publish(
        &ArtifactSpec::new("org.platform", "web", "9.0"),
        &[("org/platform/web/Handler.class", b"handler")],
        &[],
    );
    let app = fixture.path("target/api-1.0.jar");
    write_jar(&app, &[(
        "com/acme/api/Api.class",
        b"\xCA\xFE\xBA\xBE..Lorg/platform/web/Handler;..",
    )]);

    let archive = fixture
        .tool(vec![ArtifactSpec::new("com.acme", "widgets", "1.2")])
        .project_asset(ProjectAsset::artifact(
            ArtifactSpec::new("com.acme", "api", "1.0"),
            app,
            None,
        ))
        .fraction_catalog(web_catalog())
        .build()
        .await
        .unwrap();

    assert!(archive.contains("org/platform/bootstrap/Main.class"));
    assert!(archive.contains("m2repo/org/platform/web/9.0/web-9.0.jar"));
    assert!(!archive.contains("m2repo/org/platform/bootstrap/9.0/bootstrap-9.0.jar"));
    assert_eq!(
        manifest(&archive).dependencies.iter().collect::<Vec<_>>(),
        vec!["com.acme:widgets:1.2"]
    );
}

#[tokio::test]
async fn test_detection_runs_only_when_needed_unless_forced() {
    let fixture = Fixture::new();
    fixture.publish(
        &ArtifactSpec::new("org.platform", "web", "9.0"),
        &[("org/platform/web/Handler.class", b"handler")],
        &[],
    );
    let app = fixture.path("target/api-1.0.jar");
    write_jar(&app, &[(
        "com/acme/api/Api.class",
        b"\xCA\xFE\xBA\xBE..Lorg/platform/web/Handler;..",
    )]);
    let tool = |mode| {
        fixture
            .tool(vec![ArtifactSpec::new("org.platform", "bootstrap", "9.0")])
            .project_asset(ProjectAsset::artifact(
                ArtifactSpec::new("com.acme", "api", "1.0"),
                app.clone(),
                None,
            ))
            .fraction_catalog(web_catalog())
            .fraction_detection_mode(mode)
    };

    let declared = tool(FractionDetectionMode::WhenMissing).build().await.unwrap();
    assert!(!declared.contains("m2repo/org/platform/web/9.0/web-9.0.jar"));

    let forced = tool(FractionDetectionMode::Force).build().await.unwrap();
    assert!(forced.contains("m2repo/org/platform/web/9.0/web-9.0.jar"));
}

#[tokio::test]
async fn test_war_asset_library_is_filtered() {
    let fixture = Fixture::new();
    let war = fixture.path("target/shop-1.0.war");
    write_jar(&war, &[
        ("WEB-INF/classes/com/acme/shop/Shop.class", b"shop"),
        ("WEB-INF/lib/widgets-1.2.jar", b"widget"),
        ("WEB-INF/lib/core-9.0.jar", b"core"),
    ]);

    let archive = fixture
        .tool(vec![
            ArtifactSpec::new("com.acme", "widgets", "1.2"),
            ArtifactSpec::new("org.platform", "core", "9.0"),
            ArtifactSpec::new("org.platform", "bootstrap", "9.0"),
        ])
        .project_asset(ProjectAsset::artifact(
            ArtifactSpec::new("com.acme", "shop", "1.0").with_type("war"),
            &war,
            None,
        ))
        .embed_application_dependencies(true)
        .build()
        .await
        .unwrap();

    let content = archive.read("_bootstrap/shop.war").unwrap().expect("war missing");
    let content = Archive::import_zip_reader(std::io::Cursor::new(content)).unwrap();
    assert_eq!(content.paths_under("WEB-INF/lib/"), vec!["WEB-INF/lib/widgets-1.2.jar"]);
    assert!(content.contains("WEB-INF/classes/com/acme/shop/Shop.class"));
    assert!(!archive.contains("m2repo/com/acme/widgets/1.2/widgets-1.2.jar"));
    assert_eq!(manifest(&archive).asset.as_deref(), Some("shop.war"));
    assert!(war.is_file());
    assert!(!fixture.path("target/shop-1.0.war.original").exists());
}

#[tokio::test]
async fn test_application_keeps_version_chosen_for_whole_graph() {
    let fixture = Fixture::new();
    let old_gears = ArtifactSpec::new("com.acme", "gears", "2.0");
    let new_gears = ArtifactSpec::new("com.acme", "gears", "3.0");
    let bolts = ArtifactSpec::new("com.acme", "bolts", "1.0");
    fixture.publish(&old_gears, &[("com/acme/gears/Gear.class", b"old")], &[]);
    fixture.publish(&new_gears, &[("com/acme/gears/Gear.class", b"new")], &[]);
    fixture.publish(&bolts, &[("com/acme/bolts/Bolt.class", b"bolt")], &[&old_gears]);
    fixture.publish(
        &ArtifactSpec::new("com.acme", "widgets", "1.1"),
        &[("com/acme/widgets/Widget.class", b"widget")],
        &[&bolts],
    );
    fixture.publish(
        &ArtifactSpec::new("org.platform", "core", "9.0"),
        &[("org/platform/core/Core.class", b"core")],
        &[&new_gears],
    );

    let archive = fixture
        .tool(vec![
            ArtifactSpec::new("com.acme", "widgets", "1.1"),
            ArtifactSpec::new("org.platform", "core", "9.0"),
            ArtifactSpec::new("org.platform", "bootstrap", "9.0"),
        ])
        .project_asset(ProjectAsset::artifact(
            ArtifactSpec::new("com.acme", "shop", "1.0"),
            fixture.app_jar(),
            None,
        ))
        .build()
        .await
        .unwrap();

    assert_eq!(
        manifest(&archive).dependencies.iter().collect::<Vec<_>>(),
        vec!["com.acme:bolts:1.0", "com.acme:gears:3.0", "com.acme:widgets:1.1"]
    );
    assert!(!archive.contains("m2repo/com/acme/gears/3.0/gears-3.0.jar"));
}
