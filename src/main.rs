fn main() -> anyhow::Result<()> {
    til_feed::cli::run()
}
