/// Describes the machine the probes run from, e.g. `Unix Desktop (Linux)`
pub fn default_label() -> String {
    label_for(std::env::consts::OS)
}

fn label_for(os: &str) -> String {
    let (kind, name) = match os {
        "linux" => ("Unix Desktop", "Linux"),
        "macos" => ("MacBook", "macOS"),
        "windows" => ("Windows", "Windows"),
        "android" => ("Mobile", "Android"),
        "ios" => ("iPhone", "iOS"),
        _ => ("Unknown Device", "Unknown OS"),
    };
    format!("{kind} ({name})")
}
