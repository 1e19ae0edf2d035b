fn main() {
    // macOS only grants a CLI binary Bluetooth access when it carries an
    // Info.plist with NSBluetoothAlwaysUsageDescription.  Without one,
    // CoreBluetooth never leaves the "unauthorised" state and scans find
    // nothing.  The linker embeds the plist into the __TEXT,__info_plist
    // section, which macOS reads like an app bundle's Info.plist.
    //
    // CARGO_CFG_TARGET_OS is the target, so cross builds behave too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }
    let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let plist = format!("{dir}/Info.plist");
    for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
        println!("cargo:rustc-link-arg-bins={arg}");
    }
    println!("cargo:rerun-if-changed=Info.plist");
}
