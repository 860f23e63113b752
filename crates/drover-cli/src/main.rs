fn main() -> Result<(), Box<dyn std::error::Error>> {
    drover_cli::main(std::env::args().collect())
}
