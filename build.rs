fn main() {
    // Tell Cargo to re-run this script if the manifest changes
    println!("cargo:rerun-if-changed=Cargo.toml");

    // Windows-specific build configurations
    #[cfg(target_os = "windows")]
    {
        // Both tools touch the service manager, HKLM and the firewall,
        // so they must always start elevated.
        let manifest = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity
    type="win32"
    name="BeszelAgentManager"
    version="0.1.0.0"
    processorArchitecture="*"/>
  <trustInfo xmlns="urn:schemas-microsoft-com:asm.v3">
    <security>
      <requestedPrivileges>
        <requestedExecutionLevel level="requireAdministrator" uiAccess="false"/>
      </requestedPrivileges>
    </security>
  </trustInfo>
  <compatibility xmlns="urn:schemas-microsoft-com:compatibility.v1">
    <application>
      <!-- Windows 10 and 11 -->
      <supportedOS Id="{8e0f7a12-bfb3-4fe8-b9a5-48fd50a15a9a}"/>
    </application>
  </compatibility>
</assembly>"#;

        let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
        let manifest_path = std::path::Path::new(&out_dir).join("beszel_agent_manager.manifest");

        std::fs::write(&manifest_path, manifest).expect("Failed to write manifest file");

        // Embed the manifest into every binary of the package
        println!("cargo:rustc-link-arg-bins=/MANIFEST:EMBED");
        println!(
            "cargo:rustc-link-arg-bins=/MANIFESTINPUT:{}",
            manifest_path.display()
        );
    }
}
