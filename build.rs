fn main() {
    println!("cargo:rerun-if-changed=partitions.csv");

    // Only the device build needs the ESP-IDF environment; host builds
    // (tests, fuzzing) compile without it.
    #[cfg(feature = "espidf")]
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
