fn main() -> color_eyre::eyre::Result<()> {
    sopsenv::cli::main()
}
