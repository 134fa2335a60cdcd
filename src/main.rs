fn main() -> anyhow::Result<()> {
    terratrail_lib::run()
}
