use log::LevelFilter;

fn level_filter(log_level: usize) -> LevelFilter {
    match log_level {
        #[cfg(debug_assertions)]
        0 => LevelFilter::Trace,
        #[cfg(not(debug_assertions))]
        0 => LevelFilter::Debug,
        1 => LevelFilter::Debug,
        2 => LevelFilter::Info,
        3 => LevelFilter::Warn,
        4 => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

// setup logger and panic handler
pub fn init(log_level: usize) {
    env_logger::Builder::new()
        .filter_module("executor", level_filter(log_level))
        .try_init()
        .ok();
    // abort the whole process on panic in any task
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        log::error!(
            "Panic at {}",
            info.location().map(|x| x.to_string()).unwrap_or_default()
        );
        std::process::exit(1);
    }));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numeric_levels() {
        assert_eq!(level_filter(1), LevelFilter::Debug);
        assert_eq!(level_filter(4), LevelFilter::Error);
        assert_eq!(level_filter(42), LevelFilter::Info);
    }
}
