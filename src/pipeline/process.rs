use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Expands `{image}` in `args` to `image`'s path.
pub(super) fn expand_args(args: &[String], image: Option<&Path>) -> Vec<String> {
    let Some(image) = image else {
        return args.to_vec();
    };
    let path = image.to_string_lossy();
    args.iter().map(|arg| arg.replace("{image}", &path)).collect()
}

/// Runs `program`, optionally feeding `stdin`, and returns stdout.
/// A non-zero exit status is an error carrying stderr.
pub(super) fn run_capture(program: &str, args: &[String], stdin: Option<&str>) -> Result<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
    let mut child = command
        .spawn()
        .with_context(|| format!("failed to run {} (is it installed?)", program))?;
    if let Some(input) = stdin {
        let mut pipe = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to open stdin for {}", program))?;
        pipe.write_all(input.as_bytes())
            .with_context(|| format!("failed to write stdin for {}", program))?;
    }
    let output = child
        .wait_with_output()
        .with_context(|| format!("failed to wait for {}", program))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "{} failed ({}): {}",
            program,
            output.status,
            stderr.trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_image_placeholder() {
        let args = vec!["{image}".to_string(), "stdout".to_string(), "-i={image}".to_string()];
        let expanded = expand_args(&args, Some(Path::new("/tmp/crop.png")));
        assert_eq!(expanded, vec!["/tmp/crop.png", "stdout", "-i=/tmp/crop.png"]);
    }

    #[test]
    fn missing_program_is_an_error() {
        let err = run_capture("definitely-not-a-real-program-1234", &[], None).unwrap_err();
        assert!(format!("{:#}", err).contains("is it installed"));
    }
}
