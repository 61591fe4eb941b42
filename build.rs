use vergen::{BuildBuilder, Emitter};
use vergen_git2::Git2Builder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::all_build()?;
    let mut emitter = Emitter::default();
    emitter.add_instructions(&build)?;

    // Release tarballs have no .git directory.
    match Git2Builder::default().sha(true).build() {
        Ok(git) => {
            emitter.add_instructions(&git)?;
        }
        Err(_) => println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown"),
    }

    emitter.emit()?;
    Ok(())
}
