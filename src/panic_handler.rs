use std::panic;

/// Pretty backtraces, and the panic recorded in the log before exiting
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        log::error!("Panic: {panic_info}");
        // Flush file loggers before exiting
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
