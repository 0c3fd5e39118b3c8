/// Parameters the fixed server arguments already set; suite values for them are dropped.
const FIXED_PARAMETERS: [&str; 3] = ["port", "protected-mode", "dir"];

/// Command line of a standalone database server.
///
/// Protected mode is disabled (clients connect over the host network), the
/// port and working directory are fixed, then every suite parameter not
/// covered by those follows as `--<name> <value>`.
pub fn standalone_server_args(
    binary: &str,
    port: u16,
    dir: &str,
    parameters: &[(String, String)],
) -> Vec<String> {
    let mut args = vec![
        binary.to_string(),
        "--protected-mode".to_string(),
        "no".to_string(),
        "--port".to_string(),
        port.to_string(),
        "--dir".to_string(),
        dir.to_string(),
    ];
    for (name, value) in parameters {
        if FIXED_PARAMETERS.contains(&name.as_str()) {
            continue;
        }
        args.push(format!("--{name}"));
        args.push(value.clone());
    }
    args
}
