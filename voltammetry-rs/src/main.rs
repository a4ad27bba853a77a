fn main() {
    voltammetry_pipeline::cli::run();
}
