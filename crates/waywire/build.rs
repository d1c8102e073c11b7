fn main() {
    for (source, exported) in [
        ("TARGET", "WAYWIRE_BUILD_TARGET"),
        ("PROFILE", "WAYWIRE_BUILD_PROFILE"),
    ] {
        if let Ok(value) = std::env::var(source) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={source}");
    }
}
