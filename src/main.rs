fn main() {
    angelauncher_lib::run()
}
