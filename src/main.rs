fn main() -> anyhow::Result<()> {
    depthctl::logging::init();
    depthctl::cli::run()
}
