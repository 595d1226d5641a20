fn main() -> anyhow::Result<()> {
    mediassist_lib::run()
}
