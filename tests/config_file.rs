use multilevel_fdtd::*;

#[test]
fn load_config_from_file() {
    let path = std::env::temp_dir()
        .join(format!("multilevel-fdtd-config-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        "num_threads = 2\ninteraction = \"noop\"\nboundary = \"absorbing\"\nmin_chunk_len = 16\n",
    )
    .unwrap();
    let config = SolverConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.num_threads, Some(2));
    assert_eq!(config.interaction, InteractionMethod::Noop);
    assert_eq!(config.boundary, BoundaryPolicy::Absorbing);
    assert_eq!(config.min_chunk_len, 16);
    assert_eq!(config.courant, 0.5);

    assert!(matches!(
        SolverConfig::from_file(std::env::temp_dir().join("does-not-exist.toml")),
        Err(SolverError::Io(_)),
    ));
}
