fn main() -> anyhow::Result<()> {
    study_monitor_lib::run()
}
