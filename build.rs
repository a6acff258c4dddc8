const COMMANDS: &[&str] = &["host_reply", "picker_event"];

fn main() {
    tauri_plugin::Builder::new(COMMANDS).build();
}
