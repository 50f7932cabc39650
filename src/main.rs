fn main() {
    ngmake::cli::run();
}
