use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    simpl::cli::main()
}
