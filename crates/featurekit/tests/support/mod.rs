//! Fixture install shared by the CLI tests

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// An install with two public features, one auto feature and one `usr` feature
    pub fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        fixture.write(
            "wlp/lib/features/servlet-4.0.mf",
            "Subsystem-SymbolicName: com.example.servlet-4.0; visibility:=public\n\
             Subsystem-Type: osgi.subsystem.feature\n\
             Subsystem-Version: 1.0.0\n\
             IBM-ShortName: servlet-4.0\n\
             WLP-AlsoKnownAs: webContainer-4.0\n\
             Subsystem-Content: com.example.servlet; version=\"[1.0,2.0)\", com.example.jsp-2.3; type=\"osgi.subsystem.feature\"\n",
        );
        fixture.write(
            "wlp/lib/features/jsp-2.3.mf",
            "Subsystem-SymbolicName: com.example.jsp-2.3; visibility:=public\n\
             Subsystem-Type: osgi.subsystem.feature\n\
             Subsystem-Version: 1.0.0\n\
             IBM-ShortName: jsp-2.3\n",
        );
        fixture.write(
            "wlp/lib/features/servlet-jsp.mf",
            "Subsystem-SymbolicName: com.example.servlet.jsp\n\
             Subsystem-Type: osgi.subsystem.feature\n\
             Subsystem-Version: 1.0.0\n\
             IBM-Provision-Capability: osgi.identity; filter:=\"(osgi.identity=com.example.servlet-4.0)\"\n",
        );
        fixture.write(
            "usr/lib/features/custom.mf",
            "Subsystem-SymbolicName: com.acme.custom; visibility:=public\n\
             Subsystem-Type: osgi.subsystem.feature\n\
             Subsystem-Version: 2.1.0\n\
             IBM-ShortName: custom-1.0\n",
        );
        fixture
    }

    pub fn write(&self, relative: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().expect("fixture path has a parent"))
            .expect("Failed to create fixture directory");
        fs::write(&path, body).expect("Failed to write fixture");
        path
    }

    pub fn cache_file(&self) -> PathBuf {
        self.dir.path().join("state/feature.cache")
    }

    /// `featurekit` with the fixture's repository flags already applied
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("featurekit").unwrap();
        cmd.env_remove("RUST_LOG")
            .env_remove("FEATUREKIT_LOG")
            .arg("--install-root")
            .arg(self.dir.path().join("wlp"))
            .arg("--usr-root")
            .arg(self.dir.path().join("usr"))
            .arg("--cache-file")
            .arg(self.cache_file());
        cmd
    }
}
